use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use fusedns::config::Config;
use fusedns::proxy::run;

#[derive(Parser)]
#[command(name = "fusedns")]
#[command(about = "Forwarding DNS resolver racing international and regional nameservers", long_about = None)]
struct Args {
    /// Config file, created with defaults if missing
    #[arg(short, long, default_value = "fusedns.toml")]
    config: PathBuf,

    /// Override the configured bind address
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Log every query (debug level)
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!(path = %args.config.display(), "failed to load config: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(bind) = args.bind {
        config.bind = bind;
    }

    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!("failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match rt.block_on(run(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
