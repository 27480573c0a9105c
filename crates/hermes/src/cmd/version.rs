use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("hermes {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    let wire = hermes_wire::WireConfig::default();
    println!("name: hermes");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!("target: {}", option_env!("HERMES_BUILD_TARGET").unwrap_or("unknown"));
    println!("api_version: {}", hermes_wire::ApiVersion::default());
    println!("record_size: {}", wire.record_size());
    println!("features: peer={}, cli=true", cfg!(feature = "peer"));

    Ok(SUCCESS)
}
