//! Guards against a job overwriting its own input.
//!
//! The output directory receives `output<N>.csv`, `output.csv` and the
//! manifest. None of those may be the input file.

use crate::chunks::{parse_chunk_sequence, FINAL_FILE};
use crate::error::{EnrichError, Result};
use crate::manifest::MANIFEST_FILE;
use std::path::{Path, PathBuf};

fn absolute(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    })
}

/// Fails when the input file would be overwritten by anything the job writes
/// into `output_dir`.
pub fn validate_output_layout(input: &Path, output_dir: &Path) -> Result<()> {
    if output_dir.exists() && !output_dir.is_dir() {
        return Err(EnrichError::UnsafeOutput(format!(
            "output directory '{}' is a file",
            output_dir.display()
        )));
    }

    let input_name = input.file_name().and_then(|n| n.to_str()).unwrap_or("");

    let written_name =
        input_name == FINAL_FILE || input_name == MANIFEST_FILE || parse_chunk_sequence(input_name).is_some();
    if !written_name {
        return Ok(());
    }

    let input_dir = absolute(input.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new(".")));
    if input_dir == absolute(output_dir) {
        return Err(EnrichError::UnsafeOutput(format!(
            "input '{}' would be overwritten by output written to '{}'",
            input.display(),
            output_dir.display()
        )));
    }
    Ok(())
}
