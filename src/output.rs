use std::fs::{self, OpenOptions};
use std::io::{prelude::*, SeekFrom};
use std::path::{Path, PathBuf};

use log::info;

use crate::error::Result;
use crate::message::util;
use crate::publish::{Finalizer, Snapshot};




/**
 * Dumps the final field of every partition into one raw binary file of
 * little-endian doubles covering the global grid that the partitions
 * actually hold: `resolution + 2` columns by `size * rows + 2` rows, which
 * is `(resolution + 2)^2` unless the partition count truncates it. Plus
 * BOV and XDMF headers so that VisIt and ParaView can open it. Each
 * partition writes its block, ghost rows included, at its own row offset;
 * neighboring blocks overlap on ghost rows, which hold equal values once the
 * halo has been exchanged. Rank 0 alone writes the headers.
 */
pub struct FinalGridWriter {
    dir: PathBuf,
    basename: String,
}




// ============================================================================
impl FinalGridWriter {

    pub fn new<P: AsRef<Path>>(dir: P, basename: &str) -> Result<Self> {
        fs::create_dir_all(dir.as_ref())?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
            basename: basename.to_string(),
        })
    }

    pub fn data_path(&self) -> PathBuf {
        self.dir.join(format!("{}.bin", self.basename))
    }

    pub fn bov_path(&self) -> PathBuf {
        self.dir.join(format!("{}.bov", self.basename))
    }

    pub fn xmf_path(&self) -> PathBuf {
        self.dir.join(format!("{}.xmf", self.basename))
    }

    fn write_bov_header(&self, snapshot: &Snapshot) -> Result<()> {
        let (nx, ny) = grid_dims(snapshot);
        let mut bov = fs::File::create(self.bov_path())?;
        writeln!(bov, "TIME: {:.6}", snapshot.time)?;
        writeln!(bov, "DATA_FILE: {}.bin", self.basename)?;
        writeln!(bov, "DATA_SIZE: {} {} 1", nx, ny)?;
        writeln!(bov, "DATA_FORMAT: DOUBLE")?;
        writeln!(bov, "VARIABLE: temperature")?;
        writeln!(bov, "DATA_ENDIAN: LITTLE")?;
        writeln!(bov, "CENTERING: nodal")?;
        writeln!(bov, "BYTE_OFFSET: 0")?;
        Ok(())
    }

    fn write_xmf_header(&self, snapshot: &Snapshot) -> Result<()> {
        let (nx, ny) = grid_dims(snapshot);
        let mut xmf = fs::File::create(self.xmf_path())?;
        writeln!(xmf, "<?xml version=\"1.0\" ?>")?;
        writeln!(xmf, "<!DOCTYPE Xdmf SYSTEM \"Xdmf.dtd\" []>")?;
        writeln!(xmf, "<Xdmf xmlns:xi=\"http://www.w3.org/2003/XInclude\" Version=\"2.2\">")?;
        writeln!(xmf, "  <Domain>")?;
        writeln!(xmf, "    <Grid Name=\"Jacobi Mesh\" GridType=\"Uniform\">")?;
        writeln!(xmf, "      <Topology TopologyType=\"3DCORECTMESH\" Dimensions=\"1 {} {}\"/>", ny, nx)?;
        writeln!(xmf, "      <Geometry GeometryType=\"ORIGIN_DXDYDZ\">")?;
        writeln!(xmf, "         <DataItem Name=\"Origin\" NumberType=\"Float\" Dimensions=\"3\" Format=\"XML\">0. 0. 0.</DataItem>")?;
        writeln!(
            xmf,
            "         <DataItem Name=\"Spacing\" NumberType=\"Float\" Dimensions=\"3\" Format=\"XML\">{} {} {}</DataItem>",
            snapshot.dx, snapshot.dx, snapshot.dx
        )?;
        writeln!(xmf, "      </Geometry>")?;
        writeln!(xmf, "      <Attribute Name=\"temperature\" Active=\"1\" AttributeType=\"Scalar\" Center=\"Node\">")?;
        writeln!(
            xmf,
            "          <DataItem Dimensions=\"1 {} {}\" NumberType=\"Float\" Precision=\"8\" Format=\"Binary\">{}.bin</DataItem>",
            ny, nx, self.basename
        )?;
        writeln!(xmf, "      </Attribute>")?;
        writeln!(xmf, "    </Grid>")?;
        writeln!(xmf, "  </Domain>")?;
        writeln!(xmf, "</Xdmf>")?;
        Ok(())
    }

    fn write_block(&self, snapshot: &Snapshot) -> Result<()> {
        let (nx, ny) = grid_dims(snapshot);
        let offset = snapshot.partition.row_offset(snapshot.resolution) * nx * 8;

        // Every rank sizes the file; no rank truncates it, since the others
        // may already have written their blocks.
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .open(self.data_path())?;
        file.set_len((nx * ny * 8) as u64)?;
        file.seek(SeekFrom::Start(offset as u64))?;
        file.write_all(&util::encode_row(snapshot.values))?;
        Ok(())
    }
}




/// Columns and rows of the global grid held by the whole group, boundary
/// rows and wall columns included.
fn grid_dims(snapshot: &Snapshot) -> (usize, usize) {
    let rows = snapshot.partition.slice_rows(snapshot.resolution);
    (snapshot.resolution + 2, snapshot.partition.size * rows + 2)
}




// ============================================================================
impl<'a> Finalizer<Snapshot<'a>> for FinalGridWriter {
    fn finalize(&mut self, snapshot: &Snapshot<'a>) -> Result<()> {
        if snapshot.partition.rank == 0 {
            self.write_bov_header(snapshot)?;
            self.write_xmf_header(snapshot)?;
        }
        self.write_block(snapshot)?;
        info!(
            "[{}] final grid written to {}",
            snapshot.partition.rank,
            self.data_path().display()
        );
        Ok(())
    }
}
