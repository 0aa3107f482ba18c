//! Filesystem helpers with operation and path context on failure.

use std::path::Path;

use crate::{Error, Result};

/// Ensure a directory exists, creating it (recursively) if needed.
pub fn ensure_dir_all_sync_with_op(op: &'static str, path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| Error::io_path(op, path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creates_nested_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("logs").join("gumshoe");

        ensure_dir_all_sync_with_op("creating log directory", &nested).unwrap();

        assert!(nested.is_dir());
    }

    #[test]
    fn test_error_carries_operation_and_path() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("occupied");
        std::fs::write(&file, b"x").unwrap();

        let err = ensure_dir_all_sync_with_op("creating log directory", &file.join("sub"))
            .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("creating log directory"));
        assert!(message.contains("occupied"));
    }
}
