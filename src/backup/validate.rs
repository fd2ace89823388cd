//! Validation functions for configuration values.
//!
//! Provides custom validation functions for directories, cron expressions and
//! the storage file extension.

use chrono::Utc;
use sanitize_filename::{is_sanitized, sanitize};
use validator::ValidationError;

use std::path::Path;

/// Accepts `""`, `tar`, `tar.xz`, ... Every dot separated part must be a valid
/// file name on its own.
pub fn validate_storage_file_ext<S: AsRef<str>>(ext: S) -> Result<(), ValidationError> {
    let ext = ext.as_ref();
    if ext.is_empty() {
        return Ok(());
    }

    for part in ext.split('.') {
        if part.is_empty() {
            return Err(ValidationError::new("InvalidStorageFileExt")
                .with_message(format!("Empty part in storage file extension {ext:?}").into()));
        }
        if part.contains('/') || !is_sanitized(part) {
            return Err(ValidationError::new("InvalidStorageFileExt").with_message(
                format!(
                    "Invalid storage file extension {ext:?}, try sanitizing like {:?}",
                    sanitize(part)
                )
                .into(),
            ));
        }
    }

    Ok(())
}

pub fn validate_dir_exist_or_created<P: AsRef<Path>>(dir: P) -> Result<(), ValidationError> {
    let dir = dir.as_ref();
    if dir.exists() {
        if !dir.is_dir() {
            return Err(ValidationError::new("InvalidDirectory")
                .with_message(format!("{:?} is not a directory", dir).into()));
        }
    } else {
        return std::fs::create_dir_all(dir).map_err(|e| {
            ValidationError::new("InvalidDirectory").with_message(
                format!("cannot create or access directory {:?}: {}", dir, e).into(),
            )
        });
    }

    Ok(())
}

/// The parent of a file that will be written must be (or become) a directory.
pub fn validate_parent_dir<P: AsRef<Path>>(file: P) -> Result<(), ValidationError> {
    match file.as_ref().parent() {
        Some(parent) if !parent.as_os_str().is_empty() => validate_dir_exist_or_created(parent),
        _ => Ok(()),
    }
}

pub fn validate_cron_str<S: AsRef<str>>(cron: S) -> Result<(), ValidationError> {
    let cron = cron.as_ref();
    if cron_parser::parse(cron, &Utc::now()).is_err() {
        return Err(ValidationError::new("InvalidCron")
            .with_message(format!("Invalid cron string: {cron:?}").into()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_storage_file_ext() {
        for ok in ["", "tar", "tar.xz", "bak"] {
            assert!(validate_storage_file_ext(ok).is_ok(), "{ok}");
        }
        for bad in [".tar", "tar.", "tar..xz", "a/b", "t?r"] {
            assert!(validate_storage_file_ext(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn test_dir_is_created() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a/b");
        validate_dir_exist_or_created(&nested).unwrap();
        assert!(nested.is_dir());

        let file = dir.path().join("file");
        std::fs::write(&file, "x").unwrap();
        assert!(validate_dir_exist_or_created(&file).is_err());
    }

    #[test]
    fn test_parent_dir() {
        let dir = TempDir::new().unwrap();
        validate_parent_dir(dir.path().join("state/state.json")).unwrap();
        assert!(dir.path().join("state").is_dir());
        assert!(validate_parent_dir("state.json").is_ok());
    }

    #[test]
    fn test_cron_str() {
        assert!(validate_cron_str("0 3 * * *").is_ok());
        assert!(validate_cron_str("not a cron").is_err());
    }
}
