use std::f64::consts::PI;

use rayon::prelude::*;

use crate::error::Result;
use crate::field::Field;
use crate::message::comm::{Communicator, Tag};
use crate::message::util;
use crate::partition::Partition;
use crate::publish::Snapshot;

/// Tag of halo rows travelling to the partition above (rank + 1).
pub const TAG_HALO_UP: Tag = 1;

/// Tag of halo rows travelling to the partition below (rank - 1).
pub const TAG_HALO_DOWN: Tag = 2;




/**
 * Where a solver is in its run. A solver that has not been constructed is
 * the uninitialized state; construction lands in `Ready`.
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Ready,
    Stepping,
    Done,
}




/**
 * A Jacobi solver for the Laplace (steady heat) equation on the unit square,
 * restricted to one horizontal slice of the global grid. The boundary
 * conditions are u(x, 0) = sin(pi x), u(x, 1) = sin(pi x) exp(-pi), and
 * u = 0 on the side walls; the exact solution is sin(pi x) exp(-pi y).
 *
 * Each slice holds `resolution / size` interior rows and `resolution`
 * interior columns, padded by one ghost row and one wall column on every
 * side. Partitions that do not own a physical edge keep a copy of their
 * neighbor's adjacent row in the ghost row on that side, refreshed by
 * `exchange_halo`.
 */
pub struct StencilSolver {
    partition: Partition,
    resolution: usize,
    max_iterations: usize,
    iteration: usize,
    dx: f64,
    field: Field,
    scratch: Vec<f64>,
}




// ============================================================================
impl StencilSolver {




    /**
     * Allocate the field for this partition and bake in the boundary
     * conditions on the physical edges this partition owns. A resolution
     * that the partition count does not divide is truncated, not rejected.
     */
    pub fn new(resolution: usize, partition: Partition, max_iterations: usize) -> Self {
        let rows = partition.slice_rows(resolution);
        let cols = resolution;
        let dx = 1.0 / (resolution as f64 + 1.0);
        let mut field = Field::zeros(rows, cols);

        let bottom: Vec<f64> = (0..cols + 2).map(|j| f64::sin(PI * j as f64 * dx)).collect();

        if partition.owns_bottom() {
            field.row_mut(0).copy_from_slice(&bottom);
        }
        if partition.owns_top() {
            let decay = f64::exp(-PI);
            for (v, b) in field.row_mut(rows + 1).iter_mut().zip(&bottom) {
                *v = b * decay;
            }
        }

        Self {
            partition,
            resolution,
            max_iterations,
            iteration: 0,
            dx,
            field,
            scratch: vec![0.0; rows * cols],
        }
    }




    /**
     * Advance one Jacobi iteration. Every interior value is replaced by the
     * average of its four neighbors from the previous iteration, summed in
     * the order north + south + east + west. Ghost rows and wall columns are
     * untouched. Returns the local residual, the sum over the interior of
     * |new - old|.
     */
    pub fn step(&mut self) -> f64 {
        let (rows, cols) = self.field.interior_shape();
        self.iteration += 1;

        if rows == 0 || cols == 0 {
            return 0.0;
        }
        let n = cols + 2;
        let old = self.field.as_slice();

        self.scratch
            .par_chunks_mut(cols)
            .enumerate()
            .for_each(|(r, out)| {
                let i = r + 1;
                for (c, v) in out.iter_mut().enumerate() {
                    let j = c + 1;
                    let north = old[(i + 1) * n + j];
                    let south = old[(i - 1) * n + j];
                    let east = old[i * n + j + 1];
                    let west = old[i * n + j - 1];
                    *v = 0.25 * (north + south + east + west);
                }
            });

        let mut residual = 0.0;

        for (r, new) in self.scratch.chunks_exact(cols).enumerate() {
            let row = &mut self.field.row_mut(r + 1)[1..=cols];
            for (v, x) in row.iter_mut().zip(new) {
                residual += (x - *v).abs();
                *v = *x;
            }
        }
        residual
    }




    /**
     * Refresh both ghost rows from the neighboring partitions, in two paired
     * exchanges: the last interior row goes up while the bottom ghost row
     * comes from below, then the first interior row goes down while the top
     * ghost row comes from above. A partition at a physical edge has no peer
     * on that side and its boundary row is left alone. Every partition of
     * the group must call this in the same iteration, or the group hangs.
     */
    pub fn exchange_halo<C: Communicator>(&mut self, comm: &C) -> Result<()> {
        if self.partition.size < 2 {
            return Ok(());
        }
        let rows = self.field.interior_shape().0;
        let below = self.partition.below();
        let above = self.partition.above();

        let upward = util::encode_row(self.field.row(rows));
        if let Some(bytes) = comm.sendrecv(above, upward, below, TAG_HALO_UP)? {
            util::decode_row_into(&bytes, self.field.row_mut(0))?;
        }

        let downward = util::encode_row(self.field.row(1));
        if let Some(bytes) = comm.sendrecv(below, downward, above, TAG_HALO_DOWN)? {
            util::decode_row_into(&bytes, self.field.row_mut(rows + 1))?;
        }
        Ok(())
    }

    pub fn phase(&self) -> Phase {
        if self.iteration >= self.max_iterations {
            Phase::Done
        } else if self.iteration == 0 {
            Phase::Ready
        } else {
            Phase::Stepping
        }
    }

    pub fn field(&self) -> &Field {
        &self.field
    }

    /// The raw row-major buffer, ghosts included.
    pub fn values(&self) -> &[f64] {
        self.field.as_slice()
    }

    /// Shape of the raw buffer, `(rows + 2, cols + 2)`.
    pub fn shape(&self) -> (usize, usize) {
        self.field.dim()
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Pseudo-time of the iteration; one unit per Jacobi sweep.
    pub fn time(&self) -> f64 {
        self.iteration as f64
    }

    pub fn dx(&self) -> f64 {
        self.dx
    }

    pub fn resolution(&self) -> usize {
        self.resolution
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Borrow the current state for a publisher, without copying.
    pub fn snapshot(&self) -> Snapshot<'_> {
        Snapshot {
            values: self.field.as_slice(),
            shape: self.field.dim(),
            iteration: self.iteration,
            time: self.time(),
            partition: self.partition,
            resolution: self.resolution,
            dx: self.dx,
        }
    }
}
