// SampleGenerator - runs every emission step, then reports the manifest
//
// Steps run in a fixed order and the first failure aborts the run. Files
// already written by earlier steps stay on disk.

use std::fs;
use std::path::PathBuf;

use crate::config::GeneratorConfig;
use crate::error::{log_sample_error, SampleError};
use crate::manifest::{self, ManifestReport};
use crate::samples;

/// One emission step: a name for logs and the function that writes its files.
type EmitStep = (
    &'static str,
    fn(&GeneratorConfig) -> Result<Vec<PathBuf>, SampleError>,
);

const STEPS: [EmitStep; 4] = [
    ("dense_arrays", samples::emit_dense_arrays),
    ("archive", samples::emit_archive),
    ("object_graphs", samples::emit_object_graphs),
    ("hierarchy", samples::emit_hierarchy),
];

/// Writes the full sample set into the configured directory
pub struct SampleGenerator {
    config: GeneratorConfig,
}

impl SampleGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Create the output directory and any missing parents.
    pub fn prepare_output_dir(&self) -> Result<(), SampleError> {
        let dir = self.config.output_dir();
        fs::create_dir_all(dir).map_err(|err| SampleError::DirectoryCreate {
            path: dir.to_path_buf(),
            details: err.to_string(),
        })
    }

    /// Run every step, then list the directory.
    pub fn run(&self) -> Result<ManifestReport, SampleError> {
        let span = tracing::info_span!(
            "generate_samples",
            output_dir = %self.config.output_dir().display(),
            seed = self.config.seed
        );
        let _guard = span.enter();

        self.prepare_output_dir()
            .inspect_err(|err| log_sample_error(err, "prepare_output_dir"))?;

        for (step, emit) in STEPS {
            let written = emit(&self.config).inspect_err(|err| log_sample_error(err, step))?;
            tracing::info!(step, files = written.len(), "[SampleGenerator] step complete");
        }

        let report = manifest::collect(self.config.output_dir())
            .inspect_err(|err| log_sample_error(err, "manifest"))?;
        tracing::info!(
            files = report.entries.len(),
            total_bytes = report.total_bytes(),
            "[SampleGenerator] run complete"
        );
        Ok(report)
    }
}
