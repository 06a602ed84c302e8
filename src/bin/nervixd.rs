//! Standalone broker process: binds the configured NXTCP/telnet listen
//! addresses and runs the poll loop until it exits or is killed.

use std::net::SocketAddr;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;

use nervix::mainloop::MioMainloop;

/// A lightweight named-endpoint request/response and topic pub/sub broker.
#[derive(Parser, Debug)]
#[command(name = "nervixd", version, about)]
struct Args {
    /// Listen for NXTCP clients on host:port. May be given multiple times.
    #[arg(long = "nxtcp", value_name = "HOST:PORT")]
    nxtcp: Vec<String>,

    /// Listen for telnet clients on host:port. May be given multiple times.
    #[arg(long = "telnet", value_name = "HOST:PORT")]
    telnet: Vec<String>,

    /// Default REQUEST timeout, in seconds, when a client doesn't specify one.
    #[arg(long, default_value_t = 4.0)]
    watch_timeout_default: f64,

    /// Longest REQUEST timeout a client is allowed to ask for, in seconds.
    #[arg(long, default_value_t = 60.0)]
    watch_timeout_max: f64,

    /// Increase log verbosity; may be repeated (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if args.nxtcp.is_empty() && args.telnet.is_empty() {
        log::error!("no listen addresses given; pass --nxtcp and/or --telnet");
        return ExitCode::FAILURE;
    }

    let mut mainloop = match MioMainloop::new(
        Duration::from_secs_f64(args.watch_timeout_default),
        Duration::from_secs_f64(args.watch_timeout_max),
    ) {
        Ok(m) => m,
        Err(e) => {
            log::error!("failed to initialize poll loop: {e}");
            return ExitCode::FAILURE;
        }
    };

    for raw in &args.nxtcp {
        match parse_addr(raw) {
            Ok(addr) => {
                if let Err(e) = mainloop.listen_nxtcp(addr) {
                    log::error!("failed to bind nxtcp listener on {addr}: {e}");
                    return ExitCode::FAILURE;
                }
            }
            Err(e) => {
                log::error!("{e}");
                return ExitCode::FAILURE;
            }
        }
    }

    for raw in &args.telnet {
        match parse_addr(raw) {
            Ok(addr) => {
                if let Err(e) = mainloop.listen_telnet(addr) {
                    log::error!("failed to bind telnet listener on {addr}: {e}");
                    return ExitCode::FAILURE;
                }
            }
            Err(e) => {
                log::error!("{e}");
                return ExitCode::FAILURE;
            }
        }
    }

    if let Err(e) = mainloop.run() {
        log::error!("poll loop exited: {e}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn parse_addr(raw: &str) -> Result<SocketAddr, nervix::ConfigError> {
    nervix::mainloop::parse_listen_addr(raw)
}
