use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info};

use crate::config::Config;
use crate::error::Result;
use crate::message::comm::Communicator;
use crate::output::FinalGridWriter;
use crate::partition::Partition;
use crate::publish::{BoxedFinalizer, BoxedPublisher, CborPublisher, LogPublisher};
use crate::solver::{Phase, StencilSolver};

/// How a run ended.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RunSummary {
    pub iterations: usize,

    /// The last global residual computed, if any check was made.
    pub residual: Option<f64>,
    pub converged: bool,
    pub interrupted: bool,
}

/// Drives one partition's solver through a run: publishes snapshots on
/// schedule, steps, exchanges the halo, and periodically agrees with the
/// rest of the group on the global residual and on whether to stop. The
/// publisher and finalizer are optional collaborators; a bare driver runs
/// the kernel alone.
///
pub struct Driver<C: Communicator> {
    solver: StencilSolver,
    comm: C,
    frequency: usize,
    check_interval: usize,
    tolerance: Option<f64>,
    publisher: Option<BoxedPublisher>,
    finalizer: Option<BoxedFinalizer>,
    stop: Option<Arc<AtomicBool>>,
}

impl<C: Communicator> Driver<C> {
    pub fn new(solver: StencilSolver, comm: C) -> Self {
        Self {
            solver,
            comm,
            frequency: 10,
            check_interval: 10,
            tolerance: None,
            publisher: None,
            finalizer: None,
            stop: None,
        }
    }

    /// Build the solver for this rank and pick collaborators from the
    /// configuration: with an output directory, snapshots go to CBOR files
    /// and the final grid to a raw dump; without one, snapshots are logged.
    ///
    pub fn from_config(config: &Config, comm: C) -> Result<Self> {
        let partition = Partition::new(comm.rank(), comm.size());
        let solver = StencilSolver::new(config.resolution, partition, config.iterations);

        let driver = Self::new(solver, comm)
            .with_frequency(config.frequency)
            .with_check_interval(config.check_interval);

        let driver = match config.tolerance {
            Some(tolerance) => driver.with_tolerance(tolerance),
            None => driver,
        };

        Ok(match &config.output {
            Some(dir) => driver
                .with_publisher(Box::new(CborPublisher::new(dir, "temperature", config.mesh)?))
                .with_finalizer(Box::new(FinalGridWriter::new(dir, "Jacobi")?)),
            None => driver.with_publisher(Box::new(LogPublisher)),
        })
    }

    pub fn with_publisher(mut self, publisher: BoxedPublisher) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn with_finalizer(mut self, finalizer: BoxedFinalizer) -> Self {
        self.finalizer = Some(finalizer);
        self
    }

    pub fn with_frequency(mut self, frequency: usize) -> Self {
        self.frequency = frequency.max(1);
        self
    }

    pub fn with_check_interval(mut self, check_interval: usize) -> Self {
        self.check_interval = check_interval.max(1);
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = Some(tolerance);
        self
    }

    /// Stop at the next residual check once the flag is raised on any rank.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn solver(&self) -> &StencilSolver {
        &self.solver
    }

    pub fn run(&mut self) -> Result<RunSummary> {
        let rank = self.comm.rank();
        let mut summary = RunSummary {
            iterations: 0,
            residual: None,
            converged: false,
            interrupted: false,
        };

        while self.solver.phase() != Phase::Done {
            if self.solver.iteration() % self.frequency == 0 {
                if let Some(publisher) = self.publisher.as_mut() {
                    publisher.publish(&self.solver.snapshot())?;
                }
            }

            let local = self.solver.step();
            self.solver.exchange_halo(&self.comm)?;

            if self.solver.iteration() % self.check_interval == 0 {
                let global = self.comm.all_reduce_max(local)?;
                summary.residual = Some(global);
                debug!("[{}] iteration={} residual={:e}", rank, self.solver.iteration(), global);

                if self.tolerance.map_or(false, |tolerance| global <= tolerance) {
                    summary.converged = true;
                    break;
                }
                if self.stop_requested()? {
                    summary.interrupted = true;
                    break;
                }
            }
        }
        summary.iterations = self.solver.iteration();

        if let Some(finalizer) = self.finalizer.as_mut() {
            finalizer.finalize(&self.solver.snapshot())?;
        }
        if rank == 0 {
            match summary.residual {
                Some(residual) => info!(
                    "Stopped at iteration {}. Maximum error = {:e}",
                    summary.iterations, residual
                ),
                None => info!("Stopped at iteration {}", summary.iterations),
            }
        }
        Ok(summary)
    }

    /// Collective: every rank learns whether any rank's stop flag is up.
    fn stop_requested(&self) -> Result<bool> {
        let local = match &self.stop {
            Some(stop) if stop.load(Ordering::SeqCst) => 1.0,
            _ => 0.0,
        };
        Ok(self.comm.all_reduce_max(local)? > 0.0)
    }
}
