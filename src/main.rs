use anyhow::{Context, Result};
use log::{error, info};

use mini_snmpd_rs::config;
use mini_snmpd_rs::mib::Mib;
use mini_snmpd_rs::mib_build;
use mini_snmpd_rs::pidfile::PidFile;
use mini_snmpd_rs::reactor::Reactor;
use mini_snmpd_rs::signal;
use mini_snmpd_rs::telemetry::ProcessClock;

const EXIT_SUCCESS: i32 = 0;
const EXIT_CONFIG_ERROR: i32 = 1;
const EXIT_SYSCALL_FAILURE: i32 = 2;

// Rust 1.47 predates `std::process::ExitCode`; wrap a plain exit-code
// integer instead.
struct ExitCode {
    code: i32,
}

impl ExitCode {
    fn new(code: i32) -> Self {
        ExitCode { code }
    }
}

fn main() {
    match _main() {
        Ok(c) => std::process::exit(c.code),
        Err(e) => {
            eprintln!("{:#}", e);
            std::process::exit(EXIT_CONFIG_ERROR);
        }
    }
}

fn _main() -> Result<ExitCode> {
    let cfg = match config::from_args() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{:#}", e);
            return Ok(ExitCode::new(EXIT_CONFIG_ERROR));
        }
    };

    setup_logger(&cfg)?;
    signal::install().context("could not install signal handlers")?;

    let _pidfile = PidFile::create("mini-snmpd-rs").context("could not create pid file")?;

    let mut mib = Mib::new();
    let indices = mib_build::build(&mut mib, &cfg).context("failed to build MIB")?;
    let clock = ProcessClock::start();

    let mut reactor = match Reactor::bind(&cfg) {
        Ok(r) => r,
        Err(e) => {
            error!("failed to bind sockets: {:#}", e);
            return Ok(ExitCode::new(EXIT_SYSCALL_FAILURE));
        }
    };

    info!(
        "mini-snmpd-rs listening on UDP/TCP port {}/{}",
        cfg.udp_port, cfg.tcp_port
    );

    match reactor.run(&mut mib, &indices, &clock, &cfg) {
        Ok(()) => {
            info!("shut down cleanly");
            Ok(ExitCode::new(EXIT_SUCCESS))
        }
        Err(e) => {
            error!("reactor failed: {:#}", e);
            Ok(ExitCode::new(EXIT_SYSCALL_FAILURE))
        }
    }
}

fn setup_logger(cfg: &config::AgentConfig) -> Result<()> {
    let level = match cfg.loglevel.as_str() {
        "none" => log::LevelFilter::Off,
        "err" => log::LevelFilter::Error,
        "notice" | "info" => log::LevelFilter::Info,
        "debug" => log::LevelFilter::Debug,
        _ => log::LevelFilter::Info,
    };

    let dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} [{}] {}",
                record.level(),
                record.target(),
                message,
            ))
        })
        .level(level);

    if cfg.syslog {
        let formatter = syslog::Formatter3164 {
            facility: syslog::Facility::LOG_DAEMON,
            hostname: None,
            process: "mini-snmpd-rs".into(),
            pid: std::process::id() as i32,
        };
        let logger =
            syslog::unix(formatter).map_err(|e| anyhow::anyhow!("could not open syslog: {e}"))?;
        dispatch.chain(Box::new(logger) as Box<dyn log::Log>).apply()?;
    } else if cfg.foreground {
        dispatch.chain(std::io::stdout()).apply()?;
    } else {
        dispatch.chain(std::io::stderr()).apply()?;
    }

    Ok(())
}
