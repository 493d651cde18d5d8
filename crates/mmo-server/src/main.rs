//! Binary entry point. CLI flags mirror the teacher's `clap`-derived
//! `Args`, extended with `env` so every flag can also come from the
//! environment the way `EnvironmentConfig` expects.

mod server;

use clap::Parser;
use mmo_core::Config;

#[derive(Parser, Debug)]
#[command(name = "mmo-server", about = "Realtime MMO game server")]
struct Args {
    #[arg(long, env = "HOST")]
    host: Option<String>,

    #[arg(long, env = "PORT")]
    port: Option<u16>,

    #[arg(long, env = "WORKER_THREADS")]
    worker_threads: Option<usize>,

    #[arg(long, env = "TICK_RATE", default_value_t = 60)]
    tick_rate: u32,
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config = Config::load()?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(worker_threads) = args.worker_threads {
        config.worker_threads = worker_threads;
    }
    config.simulation.tick_rate_hz = args.tick_rate;
    config.simulation.validate()?;

    log::info!(
        "starting mmo-server in {:?} on {}:{} ({} worker threads)",
        config.environment,
        config.host,
        config.port,
        config.worker_threads
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads)
        .enable_all()
        .build()?;

    runtime.block_on(server::run(config))
}
