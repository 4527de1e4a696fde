use std::convert::TryInto;
use std::io::{self, prelude::*};

use crate::error::{Error, Result};

/// Compute the log-base-two of the next power of two: 8 -> 3, 9 -> 4.
///
pub fn ceil_log2(x: usize) -> usize {
    let mut n = 0;
    while 1 << n < x {
        n += 1
    }
    n
}

/// Read a usize out of the given stream.
///
pub fn read_usize<R: Read>(stream: &mut R) -> io::Result<usize> {
    read_bytes_array(stream).map(usize::from_le_bytes)
}

/// Read the given number of bytes from a stream, into a vec.
///
pub fn read_bytes_vec<R: Read>(stream: &mut R, size: usize) -> io::Result<Vec<u8>> {
    let mut buffer = vec![0; size];
    read_bytes_into(stream, &mut buffer)?;
    Ok(buffer)
}

/// Read the given (const) number of bytes from a stream, into an array.
///
pub fn read_bytes_array<R: Read, const SIZE: usize>(stream: &mut R) -> io::Result<[u8; SIZE]> {
    let mut buffer = [0; SIZE];
    read_bytes_into(stream, &mut buffer)?;
    Ok(buffer)
}

/// Fill up the given buffer by reading bytes from a stream. A stream that
/// closes before the buffer is full is an `UnexpectedEof` error.
///
pub fn read_bytes_into<R: Read>(stream: &mut R, buffer: &mut [u8]) -> io::Result<()> {
    let mut cursor = 0;
    while cursor < buffer.len() {
        match stream.read(&mut buffer[cursor..]) {
            Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
            Ok(n) => cursor += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Write a length-prefixed frame.
///
pub fn write_frame<W: Write>(stream: &mut W, bytes: &[u8]) -> io::Result<()> {
    stream.write_all(&bytes.len().to_le_bytes())?;
    stream.write_all(bytes)?;
    stream.flush()
}

/// Read a length-prefixed frame written by [`write_frame`].
///
pub fn read_frame<R: Read>(stream: &mut R) -> io::Result<Vec<u8>> {
    let size = read_usize(stream)?;
    read_bytes_vec(stream, size)
}

/// Pack a row of doubles as little-endian bytes.
///
pub fn encode_row(row: &[f64]) -> Vec<u8> {
    row.iter().flat_map(|x| x.to_le_bytes()).collect()
}

/// Unpack little-endian bytes into an existing row. The byte count must
/// match the row length exactly.
///
pub fn decode_row_into(bytes: &[u8], row: &mut [f64]) -> Result<()> {
    if bytes.len() != row.len() * 8 {
        return Err(Error::RowLength {
            expected: row.len(),
            found: bytes.len() / 8,
        });
    }
    for (x, chunk) in row.iter_mut().zip(bytes.chunks_exact(8)) {
        *x = f64::from_le_bytes(chunk.try_into().unwrap_or([0; 8]));
    }
    Ok(())
}

pub fn encode_f64(x: f64) -> Vec<u8> {
    x.to_le_bytes().to_vec()
}

pub fn decode_f64(bytes: &[u8]) -> Result<f64> {
    let array: [u8; 8] = bytes
        .try_into()
        .map_err(|_| Error::Wire(format!("expected 8 bytes, got {}", bytes.len())))?;
    Ok(f64::from_le_bytes(array))
}
