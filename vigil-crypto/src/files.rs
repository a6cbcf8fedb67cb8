use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CryptoError;

/// Read and parse a JSON key or state file.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, CryptoError> {
    let contents = std::fs::read_to_string(path).map_err(|e| CryptoError::KeyFile {
        path: path.to_path_buf(),
        reason: format!("failed to read: {}", e),
    })?;
    serde_json::from_str(&contents).map_err(|e| CryptoError::KeyFile {
        path: path.to_path_buf(),
        reason: format!("failed to parse: {}", e),
    })
}

/// Write a JSON file readable only by the owner, replacing it atomically.
pub fn write_json_private<T: Serialize>(path: &Path, value: &T) -> Result<(), CryptoError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value).map_err(|e| CryptoError::KeyFile {
        path: path.to_path_buf(),
        reason: format!("failed to serialize: {}", e),
    })?;

    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("value.json");
        write_json_private(&path, &vec![1u32, 2, 3]).unwrap();
        let back: Vec<u32> = read_json(&path).unwrap();
        assert_eq!(back, vec![1, 2, 3]);
    }

    #[cfg(unix)]
    #[test]
    fn test_written_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("secret.json");
        write_json_private(&path, &"x").unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_read_corrupt_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        let result: Result<Vec<u32>, _> = read_json(&path);
        assert!(matches!(result, Err(CryptoError::KeyFile { .. })));
    }
}
