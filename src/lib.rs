//! Jacobi-insitu solves the steady heat equation on the unit square with
//! Jacobi iteration, split across partitions that each own a horizontal
//! slice of the grid. Adjacent slices keep one ghost row on each side and
//! swap edge rows after every sweep over a message layer that runs either
//! between threads of one process or between processes over TCP. Snapshots
//! of the solution can be published in situ while the run proceeds.

pub mod config;
pub mod driver;
pub mod error;
pub mod field;
pub mod gyre;
pub mod launch;
pub mod mesh;
pub mod message;
pub mod output;
pub mod partition;
pub mod publish;
pub mod solver;
