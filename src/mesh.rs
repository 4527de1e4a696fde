//! Self-describing mesh records for one partition's field, in the four mesh
//! flavours an in-situ consumer may ask for, and for the double gyre's
//! velocity. The records only borrow the field values; coordinates and
//! connectivity are generated.

use serde::{Deserialize, Serialize};

use crate::gyre::GyreSnapshot;
use crate::publish::Snapshot;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MeshType {
    Uniform,
    Rectilinear,
    Structured,
    Unstructured,
}

/// Vertex positions. Uniform grids are implicit (origin plus spacing);
/// rectilinear grids give one axis per direction; structured and
/// unstructured meshes list every vertex.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Coordset {
    Uniform {
        dims: (usize, usize),
        origin: (f64, f64),
        spacing: (f64, f64),
    },
    Rectilinear {
        x: Vec<f64>,
        y: Vec<f64>,
    },
    Explicit {
        x: Vec<f64>,
        y: Vec<f64>,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Topology {
    #[serde(rename = "type")]
    pub kind: MeshType,
    pub coordset: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_dims: Option<(usize, usize)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shape: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connectivity: Option<Vec<u32>>,
}

/// A vertex-associated field on the mesh.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VertexField<'a, T> {
    pub association: &'static str,
    pub topology: &'static str,
    pub values: &'a [T],
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MeshDescription<'a> {
    pub coordset: Coordset,
    pub topology: Topology,
    pub temperature: VertexField<'a, f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub point_ghosts: Option<GhostFlags>,
}

/// Two vertex fields read together as the components of one vector.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VectorField<'a> {
    pub association: &'static str,
    pub topology: &'static str,
    pub values: VectorComponents<'a>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VectorComponents<'a> {
    pub u: &'a [f64],
    pub v: &'a [f64],
}

/// The double gyre on its uniform grid: both velocity components as scalar
/// vertex fields, and again as the `Velocity` vector.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VelocityMesh<'a> {
    pub coordset: Coordset,
    pub topology: Topology,
    pub vel_x: VertexField<'a, f64>,
    pub vel_y: VertexField<'a, f64>,
    #[serde(rename = "Velocity")]
    pub velocity: VectorField<'a>,
}

/// Per-vertex flags: 1 on rows that duplicate a neighbor's data, 0 on rows
/// this partition owns.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GhostFlags {
    pub association: &'static str,
    pub topology: &'static str,
    pub values: Vec<u8>,
}

impl<'a> MeshDescription<'a> {
    pub fn new(kind: MeshType, snapshot: &Snapshot<'a>) -> Self {
        let (nj, ni) = snapshot.shape;
        let rows = nj - 2;
        let cols = ni - 2;
        let dx = snapshot.dx;
        let offset = snapshot.partition.row_offset(snapshot.resolution);

        let xs = || (0..ni).map(move |j| j as f64 * dx);
        let ys = || (0..nj).map(move |i| (offset + i) as f64 * dx);

        let coordset = match kind {
            MeshType::Uniform => Coordset::Uniform {
                dims: (ni, nj),
                origin: (0.0, offset as f64 * dx),
                spacing: (dx, dx),
            },
            MeshType::Rectilinear => Coordset::Rectilinear {
                x: xs().collect(),
                y: ys().collect(),
            },
            MeshType::Structured | MeshType::Unstructured => Coordset::Explicit {
                x: ys().flat_map(|_| xs()).collect(),
                y: ys().flat_map(|y| xs().map(move |_| y)).collect(),
            },
        };

        let topology = Topology {
            kind,
            coordset: "coords",
            element_dims: match kind {
                MeshType::Structured => Some((cols + 1, rows + 1)),
                _ => None,
            },
            shape: match kind {
                MeshType::Unstructured => Some("quad"),
                _ => None,
            },
            connectivity: match kind {
                MeshType::Unstructured => Some(quad_connectivity(rows, cols)),
                _ => None,
            },
        };

        let point_ghosts = match kind {
            MeshType::Uniform | MeshType::Rectilinear => Some(GhostFlags {
                association: "vertex",
                topology: "mesh",
                values: ghost_flags(snapshot, nj, ni),
            }),
            _ => None,
        };

        Self {
            coordset,
            topology,
            temperature: VertexField {
                association: "vertex",
                topology: "mesh",
                values: snapshot.values,
            },
            point_ghosts,
        }
    }

    pub fn num_vertices(&self) -> usize {
        self.temperature.values.len()
    }
}

impl<'a> VelocityMesh<'a> {
    pub fn new(snapshot: &GyreSnapshot<'a>) -> Self {
        let vertex = |values| VertexField {
            association: "vertex",
            topology: "mesh",
            values,
        };
        Self {
            coordset: Coordset::Uniform {
                dims: snapshot.dims,
                origin: snapshot.origin,
                spacing: snapshot.spacing,
            },
            topology: Topology {
                kind: MeshType::Uniform,
                coordset: "coords",
                element_dims: None,
                shape: None,
                connectivity: None,
            },
            vel_x: vertex(snapshot.vel_x),
            vel_y: vertex(snapshot.vel_y),
            velocity: VectorField {
                association: "vertex",
                topology: "mesh",
                values: VectorComponents {
                    u: snapshot.vel_x,
                    v: snapshot.vel_y,
                },
            },
        }
    }
}

/// Quadrilaterals over the full vertex grid, ghosts included, with
/// counter-clockwise-from-origin vertex order.
fn quad_connectivity(rows: usize, cols: usize) -> Vec<u32> {
    let n = (cols + 2) as u32;
    let mut connectivity = Vec::with_capacity(4 * (rows + 1) * (cols + 1));

    for iy in 0..=rows as u32 {
        for ix in 0..=cols as u32 {
            connectivity.extend_from_slice(&[
                ix + iy * n,
                ix + (iy + 1) * n,
                ix + (iy + 1) * n + 1,
                ix + iy * n + 1,
            ]);
        }
    }
    connectivity
}

fn ghost_flags(snapshot: &Snapshot, nj: usize, ni: usize) -> Vec<u8> {
    let mut flags = vec![0; nj * ni];
    let partition = snapshot.partition;

    if partition.size > 1 {
        if !partition.owns_bottom() {
            flags[..ni].iter_mut().for_each(|f| *f = 1);
        }
        if !partition.owns_top() {
            flags[(nj - 1) * ni..].iter_mut().for_each(|f| *f = 1);
        }
    }
    flags
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::partition::Partition;
    use crate::solver::StencilSolver;

    #[test]
    fn uniform_origin_moves_with_the_rank() {
        let solver = StencilSolver::new(8, Partition::new(1, 2), 1);
        let mesh = MeshDescription::new(MeshType::Uniform, &solver.snapshot());
        let dx = 1.0 / 9.0;

        match mesh.coordset {
            Coordset::Uniform {
                dims,
                origin,
                spacing,
            } => {
                assert_eq!(dims, (10, 6));
                assert_eq!(origin, (0.0, 4.0 * dx));
                assert_eq!(spacing, (dx, dx));
            }
            other => panic!("unexpected coordset {:?}", other),
        }
        assert_eq!(mesh.num_vertices(), 60);
    }

    #[test]
    fn rectilinear_axes_span_the_slice() {
        let solver = StencilSolver::new(4, Partition::new(1, 2), 1);
        let mesh = MeshDescription::new(MeshType::Rectilinear, &solver.snapshot());

        match mesh.coordset {
            Coordset::Rectilinear { x, y } => {
                assert_eq!(x.len(), 6);
                assert_eq!(y.len(), 4);
                assert!((x[5] - 1.0).abs() < 1e-15);
                assert!((y[0] - 0.4).abs() < 1e-15);
                assert!((y[3] - 1.0).abs() < 1e-15);
            }
            other => panic!("unexpected coordset {:?}", other),
        }
    }

    #[test]
    fn explicit_coordinates_are_a_row_major_meshgrid() {
        let solver = StencilSolver::new(2, Partition::single(), 1);
        let mesh = MeshDescription::new(MeshType::Structured, &solver.snapshot());
        assert_eq!(mesh.topology.element_dims, Some((3, 3)));

        match mesh.coordset {
            Coordset::Explicit { x, y } => {
                assert_eq!(x.len(), 16);
                assert_eq!(&x[4..8], &x[0..4]);
                assert!(y[0..4].iter().all(|&v| v == 0.0));
                assert!(y[12..16].iter().all(|&v| v == 1.0));
            }
            other => panic!("unexpected coordset {:?}", other),
        }
    }

    #[test]
    fn unstructured_mesh_is_made_of_quads() {
        let solver = StencilSolver::new(2, Partition::single(), 1);
        let mesh = MeshDescription::new(MeshType::Unstructured, &solver.snapshot());
        let connectivity = mesh.topology.connectivity.unwrap();

        assert_eq!(mesh.topology.shape, Some("quad"));
        assert_eq!(connectivity.len(), 4 * 9);
        assert_eq!(&connectivity[0..4], &[0, 4, 5, 1]);
        assert_eq!(&connectivity[32..36], &[10, 14, 15, 11]);
        assert!(mesh.point_ghosts.is_none());
    }

    #[test]
    fn velocity_mesh_spans_the_gyre_domain() {
        let mut gyre = crate::gyre::DoubleGyre::new(8, 4).unwrap();
        gyre.compute_step();
        let mesh = VelocityMesh::new(&gyre.snapshot());

        match mesh.coordset {
            Coordset::Uniform {
                dims,
                origin,
                spacing,
            } => {
                assert_eq!(dims, (8, 4));
                assert_eq!(origin, (0.0, 0.0));
                assert_eq!(spacing, (2.0 / 7.0, 1.0 / 3.0));
            }
            other => panic!("unexpected coordset {:?}", other),
        }
        assert_eq!(mesh.vel_x.values, gyre.vel_x());
        assert_eq!(mesh.velocity.values.v, gyre.vel_y());
    }

    #[test]
    fn ghost_rows_are_flagged_on_shared_sides_only() {
        let flags = |rank, size| {
            let solver = StencilSolver::new(4, Partition::new(rank, size), 1);
            MeshDescription::new(MeshType::Uniform, &solver.snapshot())
                .point_ghosts
                .unwrap()
                .values
        };
        let single = flags(0, 1);
        assert!(single.iter().all(|&f| f == 0));

        let bottom = flags(0, 2);
        assert!(bottom[..6].iter().all(|&f| f == 0));
        assert!(bottom[18..].iter().all(|&f| f == 1));

        let middle = flags(1, 4);
        assert_eq!(middle.len(), 18);
        assert!(middle[..6].iter().all(|&f| f == 1));
        assert!(middle[6..12].iter().all(|&f| f == 0));
        assert!(middle[12..].iter().all(|&f| f == 1));
    }
}
