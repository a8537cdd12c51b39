mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "kwbus", version, about = "Keyword publish/subscribe over sockets, files and pipes")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let code = cmd::run(cli.command, format).unwrap_or_else(|err| {
        eprintln!("error: {err}");
        err.code
    });
    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use kwbus_transport::TransportKind;

    use super::*;

    #[test]
    fn parses_publish_subcommand() {
        let cli = Cli::try_parse_from([
            "kwbus",
            "publish",
            "socket",
            "127.0.0.1:7400",
            "--keyword",
            "STATE",
            "--data",
            "x=1",
            "--count",
            "3",
        ])
        .expect("publish args should parse");

        match cli.command {
            Command::Publish(args) => {
                assert_eq!(args.endpoint.kind, Some(TransportKind::Socket));
                assert_eq!(args.endpoint.keyword, "STATE");
                assert_eq!(args.count, Some(3));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_conflicting_payload_args() {
        let err = Cli::try_parse_from([
            "kwbus", "publish", "file", "/tmp/bus", "-k", "PLAN", "--data", "a", "--file",
            "/tmp/p",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn config_replaces_kind_and_address() {
        let cli = Cli::try_parse_from([
            "kwbus",
            "subscribe",
            "--config",
            "/tmp/hub.json",
            "--keyword",
            "PLAN",
            "--timeout",
            "3s",
        ])
        .expect("subscribe with config should parse");
        assert!(matches!(cli.command, Command::Subscribe(_)));

        let err = Cli::try_parse_from(["kwbus", "subscribe", "--keyword", "PLAN"])
            .expect_err("an endpoint is required");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn rejects_unknown_transport_kind() {
        let err = Cli::try_parse_from(["kwbus", "publish", "carrier", "x", "-k", "STATE"])
            .expect_err("unknown kind should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }
}
