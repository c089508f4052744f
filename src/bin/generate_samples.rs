use std::process::ExitCode;

use anyhow::{Context, Result};
use dataviewer_samples::{init_logging, GeneratorConfig, ManifestReport, SampleGenerator};

fn main() -> ExitCode {
    init_logging();
    let result = run(GeneratorConfig::default());
    if let Err(err) = &result {
        eprintln!("generate_samples error: {err:?}");
    }
    ExitCode::from(exit_status(&result))
}

fn run(config: GeneratorConfig) -> Result<()> {
    let report = generate(config)?;
    report.print_table();
    match report.to_json() {
        Ok(json) => tracing::debug!("[Manifest] {json}"),
        Err(err) => tracing::warn!(error = %err, "[Manifest] JSON rendering failed"),
    }
    Ok(())
}

fn generate(config: GeneratorConfig) -> Result<ManifestReport> {
    SampleGenerator::new(config)
        .run()
        .context("generating sample files")
}

fn exit_status<T>(result: &Result<T>) -> u8 {
    match result {
        Ok(_) => 0,
        Err(_) => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_run_exits_with_status_one() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("occupied");
        std::fs::write(&blocker, b"file, not a directory").unwrap();

        let result = generate(GeneratorConfig::with_output_dir(blocker.join("samples")));
        assert_eq!(exit_status(&result), 1);
        let err = result.unwrap_err();
        assert!(format!("{err:?}").contains("generating sample files"));
    }

    #[test]
    fn test_successful_run_exits_with_status_zero() {
        let dir = tempfile::tempdir().unwrap();
        let result = generate(GeneratorConfig::with_output_dir(dir.path()));
        assert_eq!(exit_status(&result), 0);
        let report = result.unwrap();
        assert!(report.to_json().unwrap().contains("\"size_bytes\""));
    }
}
