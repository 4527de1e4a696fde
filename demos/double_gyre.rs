use std::path::PathBuf;

use clap::Parser;
use jacobi_insitu::gyre::DoubleGyre;
use jacobi_insitu::mesh::MeshType;
use jacobi_insitu::publish::{CborPublisher, LogPublisher};
use log::{info, LevelFilter};
use simple_logger::SimpleLogger;

#[derive(Debug, Parser)]
#[clap(version = "1.0", author = "J. Zrake <jzrake@clemson.edu>")]
struct Opts {
    /// Nodes along x; must be twice the y resolution
    #[clap(short = 'x', long, default_value = "128")]
    x_res: usize,

    /// Nodes along y
    #[clap(short = 'y', long, default_value = "64")]
    y_res: usize,

    #[clap(short = 'i', long, default_value = "100")]
    iterations: usize,

    /// Publish a snapshot every this many steps
    #[clap(short = 'f', long, default_value = "10")]
    frequency: usize,

    /// Directory for velocity snapshots; they are only logged if absent
    #[clap(short = 'o', long)]
    output: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .init()
        .map_err(|e| e.to_string())?;

    let opts = Opts::parse();
    let mut gyre = DoubleGyre::new(opts.x_res, opts.y_res)?;

    match &opts.output {
        Some(dir) => {
            let mut publisher = CborPublisher::new(dir, "velocity", MeshType::Uniform)?;
            gyre.run(opts.iterations, opts.frequency, &mut publisher)?;
            info!("Wrote {} snapshots to {}", publisher.written().len(), dir.display());
        }
        None => gyre.run(opts.iterations, opts.frequency, &mut LogPublisher)?,
    }

    let peak = gyre.vorticity().iter().fold(0.0_f64, |a, w| a.max(w.abs()));
    info!("Final max |vorticity| = {:.4}", peak);
    Ok(())
}
