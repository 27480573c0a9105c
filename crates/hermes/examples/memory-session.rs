//! A master and a slave talking over an in-memory channel pair.

use std::thread;

use hermes::peer::{Master, Property, PropertyProvider, PropertyTable, Slave, TokenAuthority};
use hermes::transport::MemoryChannel;
use hermes::wire::{FixedPoint, Serial, Value};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (slave_end, master_end) = MemoryChannel::pair();
    let serial = Serial::from_hex("00000000cafe0001")?;

    let slave_serial = serial.clone();
    let slave = thread::spawn(move || -> hermes::peer::Result<()> {
        let table = PropertyTable::new()
            .with(Property::read_only("Model", Value::String("Widget".into())))
            .with(Property::new("Level", Value::Float(FixedPoint::from_f64(2.5, 1000))));
        let mut slave = Slave::new(table, slave_end, slave_serial);
        slave.handshake()?;
        slave.run()
    });

    let mut master = Master::new().with_authenticator(TokenAuthority::allow_all());
    master.accept(master_end)?;

    if let Some(descriptor) = master.slave_mut(&serial) {
        for index in 0..descriptor.properties_count() {
            if let Some(envelope) = descriptor.get(index) {
                println!("{index}: {} ({}) = {}", envelope.name, envelope.value_type(), envelope.value);
            }
        }
        let level = descriptor.set_by_name("Level", Value::Float(FixedPoint::from_f64(9.0, 1000)))?;
        println!("Level is now {}", level.value);
    }

    master.close(&serial);
    slave
        .join()
        .map_err(|_| "slave thread panicked")??;
    Ok(())
}
