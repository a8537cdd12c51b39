use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("kwbus {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: kwbus");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "build_target: {}",
        option_env!("KWBUS_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!("transports: socket, file{}", if cfg!(unix) { ", pipe" } else { "" });
    println!(
        "wire: magic=KW chunk_size={} max_payload={}",
        kwbus_frame::DEFAULT_CHUNK_SIZE,
        kwbus_frame::DEFAULT_MAX_PAYLOAD
    );

    Ok(SUCCESS)
}
