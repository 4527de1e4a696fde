use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use clap::Parser;
use jacobi_insitu::config::Config;
use jacobi_insitu::driver::Driver;
use jacobi_insitu::message::tcp::TcpCommunicator;
use log::{info, LevelFilter};
use signal_hook::consts::SIGINT;
use simple_logger::SimpleLogger;

/// One rank of a multi-process run. Start one process per address in
/// `--peers`, each with its own `--rank`; the number of peers is the number
/// of partitions.
#[derive(Debug, Parser)]
#[clap(version = "1.0", author = "J. Zrake <jzrake@clemson.edu>")]
struct Opts {
    #[clap(flatten)]
    config: Config,

    /// This process's rank
    #[clap(long)]
    rank: usize,

    /// Listening address of every rank, in rank order
    #[clap(long, required = true, value_delimiter = ',')]
    peers: Vec<SocketAddr>,

    #[clap(short = 'v', long, parse(from_occurrences))]
    verbose: u64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let opts = Opts::parse();
    let level = match opts.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    SimpleLogger::new()
        .with_level(level)
        .init()
        .map_err(|e| e.to_string())?;

    let config = Config {
        partitions: opts.peers.len(),
        ..opts.config
    }
    .validate()?;

    let stop = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(SIGINT, stop.clone())?;

    let comm = TcpCommunicator::new(opts.rank, opts.peers)?;
    let summary = Driver::from_config(&config, comm)?
        .with_stop_flag(stop)
        .run()?;

    info!("[{}] {:?}", opts.rank, summary);
    Ok(())
}
