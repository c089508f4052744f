//! Generator configuration.
//!
//! The output location and the random seed travel as an explicit value into
//! every emission step instead of living in module-level state.

use std::path::{Path, PathBuf};

use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Fixed sample location: `test/samples` under the crate root.
pub const DEFAULT_OUTPUT_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/test/samples");

/// Seed for randomly filled arrays; fixed so re-runs are byte-identical.
pub const DEFAULT_SEED: u64 = 0x5A5A_FFF0;

/// Complete generator configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneratorConfig {
    /// Directory every sample file is written into (created if absent)
    pub output_dir: PathBuf,
    /// Base seed; each emission step mixes in its own salt
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_seed() -> u64 {
    DEFAULT_SEED
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            seed: DEFAULT_SEED,
        }
    }
}

impl GeneratorConfig {
    /// Default configuration pointed at another directory (used by tests).
    pub fn with_output_dir<P: Into<PathBuf>>(output_dir: P) -> Self {
        Self {
            output_dir: output_dir.into(),
            ..Self::default()
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Full path of a sample file inside the output directory.
    pub fn path_for(&self, file_name: &str) -> PathBuf {
        self.output_dir.join(file_name)
    }

    /// RNG for one emission step. Salting per step keeps the steps
    /// independent of the order they run in.
    pub fn rng_for(&self, salt: u64) -> StdRng {
        StdRng::seed_from_u64(self.seed ^ salt)
    }
}
