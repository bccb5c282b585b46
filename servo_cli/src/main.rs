//! `servo` binary: config loading, logging setup, and command dispatch.

mod cli;
mod error_fmt;
mod rt;
mod run;

use clap::Parser;
use cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use tracing_subscriber::EnvFilter;

fn init_logging(args: &Cli, logging: &servo_config::Logging) {
    let level = logging
        .level
        .clone()
        .unwrap_or_else(|| args.log_level.clone());
    let filter = EnvFilter::try_new(&level)
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_default();

    match &logging.file {
        Some(path) => {
            let path = std::path::Path::new(path);
            let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
            let file = path
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_else(|| "servo.log".to_string());
            let appender = match logging.rotation.as_deref() {
                Some("daily") => tracing_appender::rolling::daily(dir, file),
                Some("hourly") => tracing_appender::rolling::hourly(dir, file),
                _ => tracing_appender::rolling::never(dir, file),
            };
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .json()
                .init();
        }
        None if args.json => {
            tracing_subscriber::fmt().with_env_filter(filter).json().init();
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
}

fn main() {
    let args = Cli::parse();
    let _ = JSON_MODE.set(args.json);
    color_eyre::install().ok();

    if let Err(err) = dispatch(&args) {
        error_fmt::report(&err);
        std::process::exit(1);
    }
}

fn dispatch(args: &Cli) -> eyre::Result<()> {
    let cfg = servo_config::load_file(&args.config)?;
    init_logging(args, &cfg.logging);

    match &args.cmd {
        Commands::Check => {
            println!("config OK: {}", args.config.display());
            Ok(())
        }
        Commands::Run {
            simulate,
            run_ms,
            rt,
            rt_prio,
            rt_lock,
            rt_cpu,
        } => run::run_controller(
            &cfg,
            run::RunOpts {
                simulate: *simulate,
                run_ms: *run_ms,
                rt: *rt,
                rt_prio: *rt_prio,
                rt_lock: *rt_lock,
                rt_cpu: *rt_cpu,
            },
        ),
    }
}
