//! Safety utilities to prevent accidental catalog loss.
//!
//! The filtered DAT and the unmatched-title reports must never land on top
//! of the input catalog, and a crash mid-write must never leave a truncated
//! output behind.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Validates that an output path is safe to overwrite.
///
/// The output cannot be the same file as any of the provided source paths.
pub fn validate_output_path(output: &Path, source_paths: &[&Path]) -> Result<()> {
    for source in source_paths {
        if output == *source {
            bail!(
                "Safety check failed: output '{}' cannot be the same as source '{}'",
                output.display(),
                source.display()
            );
        }
    }
    Ok(())
}

/// Writes `contents` to `path` through a temporary sibling file and a rename,
/// so readers only ever see the old file or the complete new one.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    fs::write(&tmp, contents)
        .with_context(|| format!("Failed to write temporary file '{}'", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| {
        format!(
            "Failed to move '{}' into place at '{}'",
            tmp.display(),
            path.display()
        )
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distinct_output_accepted() {
        let output = PathBuf::from("/tmp/catalog_filtered.dat");
        let source = PathBuf::from("/data/catalog.dat");
        assert!(validate_output_path(&output, &[&source]).is_ok());
    }

    #[test]
    fn test_output_equals_source() {
        let path = PathBuf::from("/data/catalog.dat");
        let result = validate_output_path(&path, &[&path]);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("cannot be the same as source"));
    }

    #[test]
    fn test_write_atomic_replaces_contents() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("datsieve-atomic-{}.txt", std::process::id()));

        write_atomic(&path, "first").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "first");
        write_atomic(&path, "second").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "second");

        fs::remove_file(&path).unwrap();
    }
}
