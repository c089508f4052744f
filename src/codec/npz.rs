//! NumPy `.npz` multi-array archive.
//!
//! A ZIP file whose members are complete `.npy` images named `<array>.npy`.
//! Members are DEFLATE-compressed (the `savez_compressed` flavour) and carry
//! the fixed 1980-01-01 DOS timestamp so re-runs produce identical bytes.

use std::fs::File;
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use crate::array::DenseArray;
use crate::codec::{npy, read_file};
use crate::error::{ErrorCode, SampleError};

/// Suffix every archive member carries.
pub const MEMBER_SUFFIX: &str = ".npy";

/// Ordered set of uniquely named arrays.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NamedArrays {
    entries: Vec<(String, DenseArray)>,
}

impl NamedArrays {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an array; names must be non-empty and unique within the set.
    pub fn insert(&mut self, name: impl Into<String>, array: DenseArray) -> Result<(), SampleError> {
        let name = name.into();
        if name.is_empty() || name.contains('/') {
            return Err(SampleError::UnsupportedValue {
                reason: format!("invalid archive member name {name:?}"),
            });
        }
        if self.get(&name).is_some() {
            return Err(SampleError::DuplicateName { name });
        }
        self.entries.push((name, array));
        Ok(())
    }

    /// Builder form of [`NamedArrays::insert`].
    pub fn with(mut self, name: impl Into<String>, array: DenseArray) -> Result<Self, SampleError> {
        self.insert(name, array)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&DenseArray> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, array)| array)
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DenseArray)> {
        self.entries.iter().map(|(name, array)| (name.as_str(), array))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Stream the archive into `writer`, returning it once the central
/// directory is written.
pub fn write<W: Write + Seek>(writer: W, arrays: &NamedArrays) -> Result<W, SampleError> {
    if arrays.is_empty() {
        return Err(SampleError::EmptyArchive);
    }

    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default());
    let mut zip = ZipWriter::new(writer);
    for (name, array) in arrays.iter() {
        zip.start_file(format!("{name}{MEMBER_SUFFIX}"), options)?;
        npy::write(&mut zip, array)?;
    }
    Ok(zip.finish()?)
}

/// Full archive image in memory.
pub fn encode(arrays: &NamedArrays) -> Result<Vec<u8>, SampleError> {
    Ok(write(Cursor::new(Vec::new()), arrays)?.into_inner())
}

/// Write the archive to `path`, overwriting any existing file.
pub fn save(path: &Path, arrays: &NamedArrays) -> Result<u64, SampleError> {
    if arrays.is_empty() {
        return Err(SampleError::EmptyArchive);
    }
    let write_failed = |details: String| SampleError::WriteFailed {
        path: path.to_path_buf(),
        details,
    };

    let file = File::create(path).map_err(|err| write_failed(err.to_string()))?;
    let file = write(file, arrays).map_err(|err| write_failed(err.message()))?;
    let size = file
        .metadata()
        .map_err(|err| write_failed(err.to_string()))?
        .len();
    log::info!(
        "[Npz] wrote {} ({} members: {}, {} bytes)",
        path.display(),
        arrays.len(),
        arrays.names().join(", "),
        size
    );
    Ok(size)
}

/// Read every member back, in archive order, with the `.npy` suffix removed.
pub fn read<R: Read + Seek>(reader: R) -> Result<NamedArrays, SampleError> {
    let mut archive = ZipArchive::new(reader)?;
    let mut arrays = NamedArrays::new();

    for index in 0..archive.len() {
        let mut member = archive.by_index(index)?;
        let name = member.name().to_string();
        let mut bytes = Vec::with_capacity(member.size() as usize);
        member.read_to_end(&mut bytes)?;
        let array = npy::decode(&bytes)?;
        let stem = name.strip_suffix(MEMBER_SUFFIX).unwrap_or(&name);
        arrays.insert(stem, array)?;
    }
    Ok(arrays)
}

pub fn load(path: &Path) -> Result<NamedArrays, SampleError> {
    read(Cursor::new(read_file(path)?))
}
