//! Little-endian primitives for the sequential parameter stream.
//!
//! Every block writes `[u8 version][payload]`; parameters write
//! `[u8 version][u32 name len][name][u32 dtype tag][u32 rank][u64 dims..][u64 byte len][bytes]`.
//! I/O failures carry an empty path here; callers attach the block path with
//! [`NnError::within`].

use std::io::{Read, Write};

use crate::error::{NnError, Result};

/// Encoding version shared by every block variant and by parameters.
pub const FORMAT_VERSION: u8 = 1;

/// Upper bound on an encoded parameter name, guarding against garbage length prefixes.
const MAX_NAME_LEN: usize = 4096;

fn io_err(err: std::io::Error) -> NnError {
    NnError::io(String::new(), err)
}

pub fn write_u8(w: &mut dyn Write, value: u8) -> Result<()> {
    w.write_all(&[value]).map_err(io_err)
}

pub fn write_u32(w: &mut dyn Write, value: u32) -> Result<()> {
    w.write_all(&value.to_le_bytes()).map_err(io_err)
}

pub fn write_u64(w: &mut dyn Write, value: u64) -> Result<()> {
    w.write_all(&value.to_le_bytes()).map_err(io_err)
}

pub fn write_bytes(w: &mut dyn Write, bytes: &[u8]) -> Result<()> {
    w.write_all(bytes).map_err(io_err)
}

pub fn write_str(w: &mut dyn Write, value: &str) -> Result<()> {
    let len = u32::try_from(value.len())
        .map_err(|_| NnError::invalid_argument(format!("name too long: {} bytes", value.len())))?;
    write_u32(w, len)?;
    write_bytes(w, value.as_bytes())
}

pub fn read_u8(r: &mut dyn Read) -> Result<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf).map_err(io_err)?;
    Ok(buf[0])
}

pub fn read_u32(r: &mut dyn Read) -> Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf).map_err(io_err)?;
    Ok(u32::from_le_bytes(buf))
}

pub fn read_u64(r: &mut dyn Read) -> Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf).map_err(io_err)?;
    Ok(u64::from_le_bytes(buf))
}

/// Reads exactly `len` bytes. Storage grows with the data actually read, so a corrupt
/// length prefix fails on EOF instead of allocating up front.
pub fn read_bytes(r: &mut dyn Read, len: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    (&mut *r)
        .take(len as u64)
        .read_to_end(&mut buf)
        .map_err(io_err)?;
    if buf.len() != len {
        return Err(io_err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("expected {len} bytes, stream ended after {}", buf.len()),
        )));
    }
    Ok(buf)
}

pub fn read_str(r: &mut dyn Read) -> Result<String> {
    let len = read_u32(r)? as usize;
    if len > MAX_NAME_LEN {
        return Err(NnError::invalid_argument(format!(
            "encoded name length {len} exceeds {MAX_NAME_LEN}"
        )));
    }
    let bytes = read_bytes(r, len)?;
    String::from_utf8(bytes)
        .map_err(|err| NnError::invalid_argument(format!("encoded name is not utf-8: {err}")))
}

/// Reads the leading version byte and rejects anything but [`FORMAT_VERSION`].
pub fn read_version(r: &mut dyn Read) -> Result<()> {
    let version = read_u8(r)?;
    if version != FORMAT_VERSION {
        return Err(NnError::invalid_argument(format!(
            "unsupported encoding version: {version}"
        )));
    }
    Ok(())
}
