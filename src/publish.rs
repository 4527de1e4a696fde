//! Collaborators that receive a simulation's state during and at the end of
//! a run. The simulation knows nothing about them: a driver hands each one a
//! borrowed view when a publication is due, a [`Snapshot`] for the heat
//! solver or a [`GyreSnapshot`] for the double gyre.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::gyre::GyreSnapshot;
use crate::mesh::{MeshDescription, MeshType, VelocityMesh};
use crate::partition::Partition;

/// A read-only view of one partition's field at one iteration. The values
/// slice is the solver's own row-major buffer, ghosts included.
#[derive(Clone, Copy, Debug)]
pub struct Snapshot<'a> {
    pub values: &'a [f64],
    pub shape: (usize, usize),
    pub iteration: usize,
    pub time: f64,
    pub partition: Partition,
    pub resolution: usize,
    pub dx: f64,
}

impl<'a> Snapshot<'a> {
    /// Smallest and largest value in the buffer, ghosts included.
    pub fn min_max(&self) -> (f64, f64) {
        self.values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
    }

    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            0.0
        } else {
            self.values.iter().sum::<f64>() / self.values.len() as f64
        }
    }
}

/// Receives a view of type `S` every few iterations while the run is going.
pub trait Publisher<S> {
    fn publish(&mut self, snapshot: &S) -> Result<()>;
}

/// Receives the last view once, after the run has stopped.
pub trait Finalizer<S> {
    fn finalize(&mut self, snapshot: &S) -> Result<()>;
}

/// A heat-solver publisher chosen at run time.
pub type BoxedPublisher = Box<dyn for<'a> Publisher<Snapshot<'a>>>;

/// A heat-solver finalizer chosen at run time.
pub type BoxedFinalizer = Box<dyn for<'a> Finalizer<Snapshot<'a>>>;

/// Logs summary statistics of each snapshot.
#[derive(Default)]
pub struct LogPublisher;

impl<'a> Publisher<Snapshot<'a>> for LogPublisher {
    fn publish(&mut self, snapshot: &Snapshot<'a>) -> Result<()> {
        let (lo, hi) = snapshot.min_max();
        info!(
            "[{}] iteration={} min={:.6} max={:.6} mean={:.6}",
            snapshot.partition.rank,
            snapshot.iteration,
            lo,
            hi,
            snapshot.mean()
        );
        Ok(())
    }
}

impl<'a> Publisher<GyreSnapshot<'a>> for LogPublisher {
    fn publish(&mut self, snapshot: &GyreSnapshot<'a>) -> Result<()> {
        info!(
            "[{}] t={:.2} max |u|={:.4}",
            snapshot.iteration,
            snapshot.time,
            snapshot.max_speed()
        );
        Ok(())
    }
}

impl<'a> Finalizer<GyreSnapshot<'a>> for LogPublisher {
    fn finalize(&mut self, snapshot: &GyreSnapshot<'a>) -> Result<()> {
        info!("Stopped at iteration {}", snapshot.iteration);
        Ok(())
    }
}

#[derive(Serialize)]
struct Record<'a> {
    iteration: usize,
    time: f64,
    rank: usize,
    size: usize,
    resolution: usize,
    mesh: MeshDescription<'a>,
}

#[derive(Serialize)]
struct VelocityRecord<'a> {
    iteration: usize,
    time: f64,
    mesh: VelocityMesh<'a>,
}

/// Writes every snapshot as a CBOR file holding the mesh description and
/// the field values, one file per partition per publication:
/// `{dir}/{prefix}.{iteration:04}.{rank}.cbor`, and
/// `{dir}/{prefix}.final.{rank}.cbor` at the end of the run. The mesh
/// flavour applies to heat snapshots; the double gyre is always written on
/// its uniform grid, as rank 0.
pub struct CborPublisher {
    dir: PathBuf,
    prefix: String,
    mesh: MeshType,
    written: Vec<PathBuf>,
}

impl CborPublisher {
    pub fn new<P: AsRef<Path>>(dir: P, prefix: &str, mesh: MeshType) -> Result<Self> {
        fs::create_dir_all(dir.as_ref())?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
            prefix: prefix.to_string(),
            mesh,
            written: Vec::new(),
        })
    }

    /// Every file written so far, in order.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    fn write_field(&mut self, snapshot: &Snapshot, label: &str) -> Result<()> {
        let record = Record {
            iteration: snapshot.iteration,
            time: snapshot.time,
            rank: snapshot.partition.rank,
            size: snapshot.partition.size,
            resolution: snapshot.resolution,
            mesh: MeshDescription::new(self.mesh, snapshot),
        };
        self.write(&record, label, snapshot.partition.rank)
    }

    fn write_velocity(&mut self, snapshot: &GyreSnapshot, label: &str) -> Result<()> {
        let record = VelocityRecord {
            iteration: snapshot.iteration,
            time: snapshot.time,
            mesh: VelocityMesh::new(snapshot),
        };
        self.write(&record, label, 0)
    }

    fn write<R: Serialize>(&mut self, record: &R, label: &str, rank: usize) -> Result<()> {
        let path = self
            .dir
            .join(format!("{}.{}.{}.cbor", self.prefix, label, rank));
        let mut buffer = BufWriter::new(File::create(&path)?);
        ciborium::ser::into_writer(record, &mut buffer)
            .map_err(|e| Error::Snapshot(format!("{}: {}", path.display(), e)))?;
        debug!("Wrote {}", path.display());
        self.written.push(path);
        Ok(())
    }
}

impl<'a> Publisher<Snapshot<'a>> for CborPublisher {
    fn publish(&mut self, snapshot: &Snapshot<'a>) -> Result<()> {
        self.write_field(snapshot, &format!("{:04}", snapshot.iteration))
    }
}

impl<'a> Finalizer<Snapshot<'a>> for CborPublisher {
    fn finalize(&mut self, snapshot: &Snapshot<'a>) -> Result<()> {
        self.write_field(snapshot, "final")
    }
}

impl<'a> Publisher<GyreSnapshot<'a>> for CborPublisher {
    fn publish(&mut self, snapshot: &GyreSnapshot<'a>) -> Result<()> {
        self.write_velocity(snapshot, &format!("{:04}", snapshot.iteration))
    }
}

impl<'a> Finalizer<GyreSnapshot<'a>> for CborPublisher {
    fn finalize(&mut self, snapshot: &GyreSnapshot<'a>) -> Result<()> {
        self.write_velocity(snapshot, "final")
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::solver::StencilSolver;
    use ciborium::value::Value;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("jacobi-insitu-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn lookup<'v>(map: &'v Value, key: &str) -> &'v Value {
        match map {
            Value::Map(entries) => entries
                .iter()
                .find(|(k, _)| k.as_text() == Some(key))
                .map(|(_, v)| v)
                .unwrap_or_else(|| panic!("missing key {}", key)),
            other => panic!("not a map: {:?}", other),
        }
    }

    #[test]
    fn snapshot_statistics_cover_the_whole_buffer() {
        let solver = StencilSolver::new(4, Partition::single(), 1);
        let snapshot = solver.snapshot();
        let (lo, hi) = snapshot.min_max();
        assert_eq!(lo, 0.0);
        let bottom_max = solver.field().row(0).iter().cloned().fold(f64::MIN, f64::max);
        assert_eq!(hi, bottom_max);
        assert!(hi > 0.95 && hi < 0.952);
        assert!(snapshot.mean() > 0.0);
    }

    #[test]
    fn cbor_files_are_named_by_iteration_and_rank() {
        let dir = scratch_dir("names");
        let mut publisher = CborPublisher::new(&dir, "temperature", MeshType::Uniform).unwrap();
        let mut solver = StencilSolver::new(4, Partition::new(1, 2), 3);

        publisher.publish(&solver.snapshot()).unwrap();
        solver.step();
        publisher.finalize(&solver.snapshot()).unwrap();

        let names: Vec<_> = publisher
            .written()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["temperature.0000.1.cbor", "temperature.final.1.cbor"]);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn cbor_record_carries_the_mesh_and_values() {
        let dir = scratch_dir("record");
        let mut publisher = CborPublisher::new(&dir, "t", MeshType::Unstructured).unwrap();
        let mut solver = StencilSolver::new(4, Partition::single(), 3);
        solver.step();
        publisher.publish(&solver.snapshot()).unwrap();

        let file = File::open(&publisher.written()[0]).unwrap();
        let record: Value = ciborium::de::from_reader(file).unwrap();

        assert_eq!(lookup(&record, "iteration"), &Value::Integer(1u64.into()));
        let mesh = lookup(&record, "mesh");
        let topology = lookup(mesh, "topology");
        assert_eq!(lookup(topology, "type").as_text(), Some("unstructured"));
        assert_eq!(lookup(lookup(mesh, "coordset"), "type").as_text(), Some("explicit"));

        let values = lookup(lookup(mesh, "temperature"), "values");
        match values {
            Value::Array(items) => {
                assert_eq!(items.len(), 36);
                assert_eq!(items[7], Value::Float(solver.field().get(1, 1)));
            }
            other => panic!("not an array: {:?}", other),
        }
        fs::remove_dir_all(&dir).unwrap();
    }
}
