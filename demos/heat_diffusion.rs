use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use clap::Parser;
use jacobi_insitu::config::Config;
use jacobi_insitu::driver::Driver;
use jacobi_insitu::launch::launch;
use log::{info, LevelFilter};
use signal_hook::consts::SIGINT;
use simple_logger::SimpleLogger;

#[derive(Debug, Parser)]
#[clap(version = "1.0", author = "J. Zrake <jzrake@clemson.edu>")]
struct Opts {
    #[clap(flatten)]
    config: Config,

    /// More log output; repeat for trace
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

    let config = opts.config.validate()?;
    info!("{:?}", config);

    let stop = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(SIGINT, stop.clone())?;

    let start = std::time::Instant::now();
    let summaries = launch(config.partitions, config.pin_cores, |comm| {
        Driver::from_config(&config, comm)?
            .with_stop_flag(stop.clone())
            .run()
    })?;

    for summary in summaries {
        let summary = summary?;
        if summary.interrupted {
            info!("Interrupted after {} iterations", summary.iterations);
        }
    }
    info!("Elapsed time: {:.3}s", start.elapsed().as_secs_f64());
    Ok(())
}
