// Dataviewer Samples - fixture generator
// Writes the NPY/NPZ/pickle/HDF5 sample files the viewer's test-suite loads

// Module declarations
pub mod array;
pub mod codec;
pub mod config;
pub mod error;
pub mod fill;
pub mod generator;
pub mod manifest;
pub mod samples;

// Re-exports for convenience
pub use array::{ArrayData, DType, DenseArray};
pub use config::GeneratorConfig;
pub use error::{log_sample_error, ErrorCode, SampleError};
pub use generator::SampleGenerator;
pub use manifest::{ManifestEntry, ManifestReport};

/// Install the fmt subscriber on stderr.
///
/// The subscriber also forwards `log` records, so the `[Npy]`-style lines the
/// codecs emit end up in the same stream. Calling this twice is harmless.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging();
        init_logging();
        log::info!("[Test] logging initialised twice without panicking");
    }
}
