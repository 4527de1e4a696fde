use std::f64::consts::PI;

use crate::error::{Error, Result};
use crate::publish::{Finalizer, Publisher};




/**
 * The time-dependent double gyre: two counter-rotating vortices on the
 * domain [0, 2] x [0, 1] whose dividing line oscillates periodically in x.
 * The velocity is analytic, so each step just re-evaluates it at the
 * current time on the node grid. Arrays are row-major with y as the slow
 * index.
 */
pub struct DoubleGyre {
    xres: usize,
    yres: usize,
    iteration: usize,
    timestep: f64,
    amplitude: f64,
    omega: f64,
    epsilon: f64,
    xaxis: Vec<f64>,
    yaxis: Vec<f64>,
    vel_x: Vec<f64>,
    vel_y: Vec<f64>,
}




/**
 * A borrowed view of the gyre at one iteration: the uniform node grid on
 * [0, 2] x [0, 1] and both velocity components, row-major with y slow.
 */
#[derive(Clone, Copy, Debug)]
pub struct GyreSnapshot<'a> {
    pub iteration: usize,
    pub time: f64,
    pub dims: (usize, usize),
    pub origin: (f64, f64),
    pub spacing: (f64, f64),
    pub vel_x: &'a [f64],
    pub vel_y: &'a [f64],
}

impl<'a> GyreSnapshot<'a> {
    pub fn max_speed(&self) -> f64 {
        self.vel_x
            .iter()
            .zip(self.vel_y)
            .fold(0.0, |a: f64, (u, v)| a.max(u.hypot(*v)))
    }
}




// ============================================================================
impl DoubleGyre {




    /**
     * Allocate the grid. The x resolution must be twice the y resolution,
     * so that cells are square on the 2:1 domain, and each axis needs at
     * least two nodes.
     */
    pub fn new(xres: usize, yres: usize) -> Result<Self> {
        if xres != 2 * yres {
            return Err(Error::InvalidConfig(format!(
                "double gyre needs x resolution = 2 * y resolution, got {} x {}",
                xres, yres
            )));
        }
        if yres < 2 {
            return Err(Error::InvalidConfig(format!("y resolution {} is too small", yres)));
        }
        let xaxis = (0..xres).map(|i| 2.0 * i as f64 / (xres as f64 - 1.0)).collect();
        let yaxis = (0..yres).map(|j| j as f64 / (yres as f64 - 1.0)).collect();

        Ok(Self {
            xres,
            yres,
            iteration: 0,
            timestep: 0.1,
            amplitude: 0.1 * PI,
            omega: 2.0 * PI / 10.0,
            epsilon: 0.25,
            xaxis,
            yaxis,
            vel_x: vec![0.0; xres * yres],
            vel_y: vec![0.0; xres * yres],
        })
    }




    /**
     * Evaluate the velocity at the current time, then advance the clock.
     */
    pub fn compute_step(&mut self) {
        let t = self.iteration as f64 * self.timestep;
        let a = self.epsilon * f64::sin(self.omega * t);
        let b = 1.0 - 2.0 * a;
        let xres = self.xres;

        for (iy, y) in self.yaxis.iter().enumerate() {
            for (ix, x) in self.xaxis.iter().enumerate() {
                let f = (a * x * x + b * x) * PI;
                let dfdx = 2.0 * a * x + b;
                self.vel_x[iy * xres + ix] = -self.amplitude * f64::sin(f) * f64::cos(PI * y);
                self.vel_y[iy * xres + ix] = self.amplitude * f64::cos(f) * f64::sin(PI * y) * dfdx;
            }
        }
        self.iteration += 1;
    }

    /**
     * The scalar vorticity dv/dx - du/dy, by central differences in the
     * interior and one-sided differences on the edges.
     */
    pub fn vorticity(&self) -> Vec<f64> {
        let (nx, ny) = (self.xres, self.yres);
        let derivative = |axis: &[f64], k: usize, n: usize, value: &dyn Fn(usize) -> f64| {
            let (lo, hi) = match k {
                0 => (0, 1),
                k if k == n - 1 => (n - 2, n - 1),
                k => (k - 1, k + 1),
            };
            (value(hi) - value(lo)) / (axis[hi] - axis[lo])
        };

        let mut omega = vec![0.0; nx * ny];
        for iy in 0..ny {
            for ix in 0..nx {
                let dvdx = derivative(&self.xaxis, ix, nx, &|i| self.vel_y[iy * nx + i]);
                let dudy = derivative(&self.yaxis, iy, ny, &|j| self.vel_x[j * nx + ix]);
                omega[iy * nx + ix] = dvdx - dudy;
            }
        }
        omega
    }

    /**
     * Step `iterations` times. After every step that brings the iteration
     * count to a multiple of `frequency`, the sink publishes a snapshot; it
     * finalizes the last one when the loop ends.
     */
    pub fn run<P>(&mut self, iterations: usize, frequency: usize, sink: &mut P) -> Result<()>
    where
        P: for<'a> Publisher<GyreSnapshot<'a>> + for<'a> Finalizer<GyreSnapshot<'a>>,
    {
        let frequency = frequency.max(1);

        for _ in 0..iterations {
            self.compute_step();

            if self.iteration % frequency == 0 {
                sink.publish(&self.snapshot())?;
            }
        }
        sink.finalize(&self.snapshot())
    }

    pub fn snapshot(&self) -> GyreSnapshot<'_> {
        GyreSnapshot {
            iteration: self.iteration,
            time: self.time(),
            dims: (self.xres, self.yres),
            origin: (0.0, 0.0),
            spacing: (2.0 / (self.xres as f64 - 1.0), 1.0 / (self.yres as f64 - 1.0)),
            vel_x: &self.vel_x,
            vel_y: &self.vel_y,
        }
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn time(&self) -> f64 {
        self.iteration as f64 * self.timestep
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.yres, self.xres)
    }

    pub fn xaxis(&self) -> &[f64] {
        &self.xaxis
    }

    pub fn yaxis(&self) -> &[f64] {
        &self.yaxis
    }

    pub fn vel_x(&self) -> &[f64] {
        &self.vel_x
    }

    pub fn vel_y(&self) -> &[f64] {
        &self.vel_y
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::*;
    use crate::publish::CborPublisher;
    use crate::mesh::MeshType;
    use ciborium::value::Value;

    #[derive(Default)]
    struct Recorder {
        published: Vec<usize>,
        last: Option<usize>,
    }

    impl<'a> Publisher<GyreSnapshot<'a>> for Recorder {
        fn publish(&mut self, snapshot: &GyreSnapshot<'a>) -> Result<()> {
            self.published.push(snapshot.iteration);
            Ok(())
        }
    }

    impl<'a> Finalizer<GyreSnapshot<'a>> for Recorder {
        fn finalize(&mut self, snapshot: &GyreSnapshot<'a>) -> Result<()> {
            self.last = Some(snapshot.iteration);
            Ok(())
        }
    }

    #[test]
    fn publishes_every_frequency_steps_then_finalizes() {
        let mut gyre = DoubleGyre::new(16, 8).unwrap();
        let mut recorder = Recorder::default();
        gyre.run(35, 10, &mut recorder).unwrap();

        assert_eq!(recorder.published, vec![10, 20, 30]);
        assert_eq!(recorder.last, Some(35));
    }

    #[test]
    fn cbor_snapshots_carry_the_uniform_grid_and_velocity() {
        let dir = std::env::temp_dir().join(format!("jacobi-gyre-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let mut publisher = CborPublisher::new(&dir, "velocity", MeshType::Uniform).unwrap();
        let mut gyre = DoubleGyre::new(10, 5).unwrap();
        gyre.run(20, 10, &mut publisher).unwrap();

        let names: Vec<_> = publisher
            .written()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec!["velocity.0010.0.cbor", "velocity.0020.0.cbor", "velocity.final.0.cbor"]
        );

        let file = std::fs::File::open(&publisher.written()[1]).unwrap();
        let record: Value = ciborium::de::from_reader(file).unwrap();
        let entries = |value: &Value| match value {
            Value::Map(entries) => entries.clone(),
            other => panic!("not a map: {:?}", other),
        };
        let lookup = |value: &Value, key: &str| {
            entries(value)
                .into_iter()
                .find(|(k, _)| k.as_text() == Some(key))
                .map(|(_, v)| v)
                .unwrap()
        };

        assert_eq!(lookup(&record, "iteration"), Value::Integer(20u64.into()));
        let mesh = lookup(&record, "mesh");
        let coordset = lookup(&mesh, "coordset");
        assert_eq!(lookup(&coordset, "type").as_text(), Some("uniform"));
        assert_eq!(
            lookup(&coordset, "spacing"),
            Value::Array(vec![Value::Float(2.0 / 9.0), Value::Float(0.25)])
        );
        match lookup(&lookup(&mesh, "vel_x"), "values") {
            Value::Array(values) => {
                assert_eq!(values.len(), 50);
                assert_eq!(values[13], Value::Float(gyre.vel_x()[13]));
            }
            other => panic!("not an array: {:?}", other),
        }
        assert!(matches!(lookup(&mesh, "Velocity"), Value::Map(_)));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn resolution_must_be_two_to_one() {
        assert!(DoubleGyre::new(32, 16).is_ok());
        assert!(matches!(DoubleGyre::new(32, 32), Err(Error::InvalidConfig(_))));
        assert!(matches!(DoubleGyre::new(2, 1), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn first_step_is_the_steady_gyre() {
        let mut gyre = DoubleGyre::new(8, 4).unwrap();
        gyre.compute_step();
        assert_eq!(gyre.iteration(), 1);

        // At t = 0 the flow is u = -A sin(pi x) cos(pi y), v = A cos(pi x) sin(pi y).
        let a = 0.1 * PI;
        for (iy, &y) in gyre.yaxis().iter().enumerate() {
            for (ix, &x) in gyre.xaxis().iter().enumerate() {
                let k = iy * 8 + ix;
                assert!((gyre.vel_x()[k] + a * f64::sin(PI * x) * f64::cos(PI * y)).abs() < 1e-14);
                assert!((gyre.vel_y()[k] - a * f64::cos(PI * x) * f64::sin(PI * y)).abs() < 1e-14);
            }
        }
    }

    #[test]
    fn walls_are_impermeable() {
        let mut gyre = DoubleGyre::new(20, 10).unwrap();
        for _ in 0..7 {
            gyre.compute_step();
        }
        let (ny, nx) = gyre.shape();
        for ix in 0..nx {
            assert!(gyre.vel_y()[ix].abs() < 1e-15);
            assert!(gyre.vel_y()[(ny - 1) * nx + ix].abs() < 1e-15);
        }
        for iy in 0..ny {
            assert!(gyre.vel_x()[iy * nx].abs() < 1e-15);
            assert!(gyre.vel_x()[iy * nx + nx - 1].abs() < 1e-15);
        }
    }

    #[test]
    fn gyres_spin_in_opposite_directions() {
        let mut gyre = DoubleGyre::new(40, 20).unwrap();
        gyre.compute_step();
        let omega = gyre.vorticity();
        let (ny, nx) = gyre.shape();
        let left = omega[(ny / 2) * nx + nx / 4];
        let right = omega[(ny / 2) * nx + 3 * nx / 4];
        assert!(left * right < 0.0);
        assert!((gyre.time() - 0.1).abs() < 1e-15);
    }
}
