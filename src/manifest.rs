//! Manifest of the files a run left in the output directory.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::SampleError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    pub name: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestReport {
    pub directory: PathBuf,
    pub entries: Vec<ManifestEntry>,
}

/// Enumerate every regular file in `dir`, sorted by name.
pub fn collect(dir: &Path) -> Result<ManifestReport, SampleError> {
    let listing_failed = |err: std::io::Error| SampleError::ListingFailed {
        path: dir.to_path_buf(),
        details: err.to_string(),
    };

    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).map_err(listing_failed)? {
        let entry = entry.map_err(listing_failed)?;
        let metadata = entry.metadata().map_err(listing_failed)?;
        if metadata.is_file() {
            entries.push(ManifestEntry {
                name: entry.file_name().into_string().map_err(|name| {
                    SampleError::ListingFailed {
                        path: dir.to_path_buf(),
                        details: format!("non-UTF-8 file name {name:?}"),
                    }
                })?,
                size_bytes: metadata.len(),
            });
        }
    }

    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(ManifestReport {
        directory: dir.to_path_buf(),
        entries,
    })
}

impl ManifestReport {
    /// One `  <name> <size> bytes` line per file.
    pub fn lines(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|entry| format!("  {:40} {:>8} bytes", entry.name, entry.size_bytes))
            .collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|entry| entry.name.as_str()).collect()
    }

    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|entry| entry.size_bytes).sum()
    }

    pub fn print_table(&self) {
        println!("All samples saved to: {}", self.directory.display());
        for line in self.lines() {
            println!("{line}");
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_sorts_files_and_skips_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.npy"), [0u8; 12]).unwrap();
        fs::write(dir.path().join("a.pkl"), [0u8; 3]).unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();

        let report = collect(dir.path()).unwrap();
        assert_eq!(report.names(), vec!["a.pkl", "b.npy"]);
        assert_eq!(report.entries[1].size_bytes, 12);
        assert_eq!(report.total_bytes(), 15);
    }

    #[test]
    fn test_lines_are_column_aligned() {
        let report = ManifestReport {
            directory: PathBuf::from("out"),
            entries: vec![ManifestEntry {
                name: "experiment.hdf5".to_string(),
                size_bytes: 4096,
            }],
        };
        let lines = report.lines();
        assert_eq!(
            lines[0],
            format!("  {:<40} {:>8} bytes", "experiment.hdf5", 4096)
        );
        assert_eq!(lines[0].len(), 2 + 40 + 1 + 8 + 6);
    }

    #[test]
    fn test_missing_directory_fails_listing() {
        let dir = tempfile::tempdir().unwrap();
        let err = collect(&dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, SampleError::ListingFailed { .. }));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_non_utf8_file_name_fails_listing() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(OsStr::from_bytes(b"bad\xff.npy")), [0u8; 4]).unwrap();

        match collect(dir.path()).unwrap_err() {
            SampleError::ListingFailed { details, .. } => {
                assert!(details.contains("non-UTF-8"), "{details}")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_json_rendering() {
        let report = ManifestReport {
            directory: PathBuf::from("out"),
            entries: vec![ManifestEntry {
                name: "a.npy".to_string(),
                size_bytes: 128,
            }],
        };
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["entries"][0]["name"], "a.npy");
        assert_eq!(json["entries"][0]["size_bytes"], 128);
    }
}
