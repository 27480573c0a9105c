use std::collections::HashSet;
use std::fmt;

use bytes::BytesMut;
use hermes_transport::Channel;
use hermes_wire::{
    read_message, write_message, ApiVersion, Direction, HandshakePayload, HandshakeResult,
    Payload, Serial, Token, WireConfig, WireMessage,
};
use rand::Rng as _;
use tracing::{debug, error, info, warn};

use crate::error::{PeerError, Result};

/// Decides whether a slave may open a session.
///
/// The authenticator may replace `token` to issue a new session token; the
/// master sends whatever it leaves there back to the slave.
pub trait Authenticator: Send {
    fn authenticate(&mut self, serial: &Serial, token: &mut Token) -> bool;
}

impl<F> Authenticator for F
where
    F: FnMut(&Serial, &mut Token) -> bool + Send,
{
    fn authenticate(&mut self, serial: &Serial, token: &mut Token) -> bool {
        self(serial, token)
    }
}

/// A fresh random token of `len` bytes.
pub fn issue_token(len: usize) -> Token {
    let mut rng = rand::rng();
    let bytes: Vec<u8> = (0..len).map(|_| rng.random()).collect();
    Token::new(bytes)
}

/// A fresh random serial of `len` bytes.
pub fn random_serial(len: usize) -> Serial {
    let mut rng = rand::rng();
    let bytes: Vec<u8> = (0..len).map(|_| rng.random()).collect();
    Serial::new(bytes)
}

/// Authenticator with an optional serial allow-list that issues a new token
/// on every accepted handshake.
#[derive(Clone, Default)]
pub struct TokenAuthority {
    allowed: Option<HashSet<Serial>>,
    keep_tokens: bool,
}

impl TokenAuthority {
    /// Accept every serial.
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Accept only the listed serials.
    pub fn allow(serials: impl IntoIterator<Item = Serial>) -> Self {
        Self {
            allowed: Some(serials.into_iter().collect()),
            keep_tokens: false,
        }
    }

    /// Let slaves keep the token they present instead of issuing a new one.
    pub fn keep_tokens(mut self) -> Self {
        self.keep_tokens = true;
        self
    }
}

impl Authenticator for TokenAuthority {
    fn authenticate(&mut self, serial: &Serial, token: &mut Token) -> bool {
        if let Some(allowed) = &self.allowed {
            if !allowed.contains(serial) {
                return false;
            }
        }
        if !self.keep_tokens {
            *token = issue_token(token.len());
        }
        true
    }
}

impl fmt::Debug for TokenAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenAuthority")
            .field("allowed", &self.allowed.as_ref().map(HashSet::len))
            .field("keep_tokens", &self.keep_tokens)
            .finish()
    }
}

/// Slave side: offer `version` and adopt the token the master returns.
///
/// Exactly one record is written and one is read. On any failure `token` is
/// left untouched.
pub fn initiate<C: Channel + ?Sized>(
    channel: &mut C,
    scratch: &mut BytesMut,
    serial: &Serial,
    token: &mut Token,
    version: ApiVersion,
    wire: &WireConfig,
) -> Result<()> {
    let offer = WireMessage::handshake(serial.clone(), token.clone(), HandshakePayload::offer(version));
    write_message(channel, scratch, &offer, wire)?;
    debug!(%serial, %version, "handshake offered");

    let reply = read_message(channel, scratch, wire, Direction::Reply)?;
    match reply.payload {
        Payload::Handshake(answer) => match answer.result {
            HandshakeResult::Ok => {
                *token = reply.token;
                info!(%serial, "session established");
                Ok(())
            }
            HandshakeResult::Fail => {
                warn!(%serial, "master rejected handshake");
                Err(PeerError::Rejected {
                    serial: serial.clone(),
                })
            }
            HandshakeResult::RetryLater => Err(PeerError::HandshakeFailed(
                "master asked to retry later".to_string(),
            )),
        },
        other => Err(PeerError::HandshakeFailed(format!(
            "expected handshake reply, got {}",
            other.kind()
        ))),
    }
}

/// Master side: authenticate a received handshake and echo it back.
///
/// Returns the session token on acceptance. A rejected slave, or one whose
/// issued token has the wrong length, gets the echo with `result = Fail` and
/// the call returns [`PeerError::Rejected`]. Without an authenticator nothing
/// is echoed.
pub fn respond<C, A>(
    channel: &mut C,
    scratch: &mut BytesMut,
    request: &WireMessage,
    authenticator: Option<&mut A>,
    wire: &WireConfig,
) -> Result<Token>
where
    C: Channel + ?Sized,
    A: Authenticator + ?Sized,
{
    let Payload::Handshake(offer) = &request.payload else {
        return Err(PeerError::HandshakeFailed(format!(
            "expected handshake, got {}",
            request.kind()
        )));
    };
    let Some(authenticator) = authenticator else {
        error!(serial = %request.serial, "handshake received without an authenticator");
        return Err(PeerError::MissingAuthenticator);
    };

    let serial = &request.serial;
    let mut token = request.token.clone();
    let mut echo = *offer;

    if !authenticator.authenticate(serial, &mut token) {
        warn!(%serial, "slave rejected");
        return Err(reject(channel, scratch, request, echo, wire));
    }
    if token.len() != wire.token_len {
        error!(
            %serial,
            len = token.len(),
            expected = wire.token_len,
            "authenticator produced a token of the wrong length"
        );
        return Err(reject(channel, scratch, request, echo, wire));
    }

    echo.result = HandshakeResult::Ok;
    let reply = WireMessage::handshake(serial.clone(), token.clone(), echo);
    write_message(channel, scratch, &reply, wire)?;
    info!(%serial, version = %offer.desired, "slave authenticated");
    Ok(token)
}

/// Echo `offer` back with `result = Fail`.
///
/// The rejection stands even when the echo cannot be delivered.
fn reject<C: Channel + ?Sized>(
    channel: &mut C,
    scratch: &mut BytesMut,
    request: &WireMessage,
    mut echo: HandshakePayload,
    wire: &WireConfig,
) -> PeerError {
    echo.result = HandshakeResult::Fail;
    let reply = WireMessage::handshake(request.serial.clone(), request.token.clone(), echo);
    if let Err(err) = write_message(channel, scratch, &reply, wire) {
        debug!(serial = %request.serial, error = %err, "rejection not delivered");
    }
    PeerError::Rejected {
        serial: request.serial.clone(),
    }
}
