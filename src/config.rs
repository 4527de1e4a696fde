use std::path::PathBuf;

use clap::Parser;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::mesh::MeshType;

const DEFAULT_RESOLUTION: usize = 64;
const MAX_RESOLUTION: usize = 1025;

/// Run parameters for the heat-diffusion solver. Programs flatten this into
/// their own command line options.
///
#[derive(Debug, Clone, Parser, Serialize, Deserialize)]
pub struct Config {
    /// Interior grid points along each axis of the global domain
    #[clap(short = 'r', long, default_value = "64")]
    pub resolution: usize,

    /// Maximum number of Jacobi iterations
    #[clap(short = 'i', long, default_value = "100")]
    pub iterations: usize,

    /// Number of horizontal slices the domain is split into
    #[clap(short = 'p', long, default_value = "1")]
    pub partitions: usize,

    /// Publish a snapshot every this many iterations
    #[clap(short = 'f', long, default_value = "10")]
    pub frequency: usize,

    /// Mesh flavour used to describe published snapshots
    #[clap(short = 'm', long, value_enum, default_value = "uniform")]
    pub mesh: MeshType,

    /// Stop early once the global residual falls to this value
    #[clap(long)]
    pub tolerance: Option<f64>,

    /// Iterations between global residual checks
    #[clap(long, default_value = "10")]
    pub check_interval: usize,

    /// Directory for snapshots and the final grid; nothing is written if absent
    #[clap(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Pin each partition's thread to its own core
    #[clap(long)]
    pub pin_cores: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            resolution: DEFAULT_RESOLUTION,
            iterations: 100,
            partitions: 1,
            frequency: 10,
            mesh: MeshType::Uniform,
            tolerance: None,
            check_interval: 10,
            output: None,
            pin_cores: false,
        }
    }
}

impl Config {
    /// Check the parameters and normalize the resolution. A resolution
    /// outside `1..=1025` falls back to the default. A partition count that
    /// does not divide the resolution only draws a warning: the rows left
    /// over are dropped from the run.
    ///
    pub fn validate(mut self) -> Result<Self> {
        if self.resolution == 0 || self.resolution > MAX_RESOLUTION {
            warn!(
                "resolution {} is outside 1..={}, using {}",
                self.resolution, MAX_RESOLUTION, DEFAULT_RESOLUTION
            );
            self.resolution = DEFAULT_RESOLUTION;
        }
        if self.partitions == 0 {
            return Err(Error::InvalidConfig("at least one partition is needed".into()));
        }
        if self.frequency == 0 {
            return Err(Error::InvalidConfig("publish frequency must be positive".into()));
        }
        if self.check_interval == 0 {
            return Err(Error::InvalidConfig("check interval must be positive".into()));
        }
        if let Some(tolerance) = self.tolerance {
            if !(tolerance >= 0.0) {
                return Err(Error::InvalidConfig(format!("bad tolerance {}", tolerance)));
            }
        }
        if self.resolution % self.partitions != 0 {
            warn!(
                "{} partitions do not divide resolution {}; the top {} rows are dropped",
                self.partitions,
                self.resolution,
                self.resolution % self.partitions
            );
        }
        Ok(self)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_match_the_command_line_defaults() {
        let parsed = Config::parse_from(&["heat"]);
        let default = Config::default();
        assert_eq!(parsed.resolution, default.resolution);
        assert_eq!(parsed.iterations, default.iterations);
        assert_eq!(parsed.frequency, default.frequency);
        assert_eq!(parsed.mesh, MeshType::Uniform);
        assert_eq!(parsed.tolerance, None);
    }

    #[test]
    fn command_line_sets_every_option() {
        let config = Config::parse_from(&[
            "heat", "--resolution", "32", "-i", "500", "-p", "4", "--mesh", "unstructured",
            "--tolerance", "1e-6", "--output", "/tmp/out", "--pin-cores",
        ]);
        assert_eq!(config.resolution, 32);
        assert_eq!(config.iterations, 500);
        assert_eq!(config.partitions, 4);
        assert_eq!(config.mesh, MeshType::Unstructured);
        assert_eq!(config.tolerance, Some(1e-6));
        assert_eq!(config.output, Some(PathBuf::from("/tmp/out")));
        assert!(config.pin_cores);
    }

    #[test]
    fn out_of_range_resolution_falls_back_to_the_default() {
        let config = Config {
            resolution: 5000,
            ..Config::default()
        };
        assert_eq!(config.validate().unwrap().resolution, 64);
    }

    #[test]
    fn uneven_partitions_are_accepted() {
        let config = Config {
            resolution: 10,
            partitions: 3,
            ..Config::default()
        };
        assert_eq!(config.validate().unwrap().partitions, 3);
    }

    #[test]
    fn zero_counts_are_rejected() {
        for config in vec![
            Config { partitions: 0, ..Config::default() },
            Config { frequency: 0, ..Config::default() },
            Config { check_interval: 0, ..Config::default() },
            Config { tolerance: Some(f64::NAN), ..Config::default() },
        ] {
            assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
        }
    }
}
