//! Byte-level encoders for the four sample formats, each with the matching
//! decoder the round-trip tests read samples back with.

pub mod hdf5;
pub mod npy;
pub mod npz;
pub mod pickle;

use std::fs;
use std::path::Path;

use crate::error::SampleError;

/// Write a finished container to disk, replacing any previous file.
pub(crate) fn write_file(path: &Path, bytes: &[u8]) -> Result<(), SampleError> {
    fs::write(path, bytes).map_err(|err| SampleError::WriteFailed {
        path: path.to_path_buf(),
        details: err.to_string(),
    })
}

/// Read a container back from disk.
pub(crate) fn read_file(path: &Path) -> Result<Vec<u8>, SampleError> {
    fs::read(path).map_err(|err| SampleError::Decode {
        reason: format!("failed to read {}: {err}", path.display()),
    })
}
