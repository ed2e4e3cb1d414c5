//! Helpers for the local `.env` file the provisioner records agent ids in.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnvFileError {
    #[error("could not write env file `{path}`: {source}")]
    Write { path: PathBuf, source: std::io::Error },
    #[error("could not parse env file `{path}`: {source}")]
    Parse { path: PathBuf, source: dotenvy::Error },
}

/// Appends `KEY=VALUE` on a fresh line, creating the file when missing.
pub fn append_env_entry(path: &Path, key: &str, value: &str) -> Result<(), EnvFileError> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| EnvFileError::Write { path: path.to_path_buf(), source })?;

    write!(file, "\n{key}={value}")
        .map_err(|source| EnvFileError::Write { path: path.to_path_buf(), source })
}

/// Last value recorded for `key`, or `None` when the file or key is absent.
pub fn read_env_entry(path: &Path, key: &str) -> Result<Option<String>, EnvFileError> {
    if !path.exists() {
        return Ok(None);
    }

    let entries = dotenvy::from_path_iter(path)
        .map_err(|source| EnvFileError::Parse { path: path.to_path_buf(), source })?;

    let mut found = None;
    for entry in entries {
        let (entry_key, entry_value) =
            entry.map_err(|source| EnvFileError::Parse { path: path.to_path_buf(), source })?;
        if entry_key == key && !entry_value.trim().is_empty() {
            found = Some(entry_value);
        }
    }

    Ok(found)
}

/// Loads `.env` from the working directory without overriding existing variables.
pub fn load_dotenv() -> Option<PathBuf> {
    dotenvy::dotenv().ok()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::{append_env_entry, read_env_entry};

    #[test]
    fn append_creates_file_and_preserves_existing_lines() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join(".env");
        fs::write(&path, "PROJECT_ENDPOINT=https://proj.example.com").expect("seed env file");

        append_env_entry(&path, "EXEMPT_AGENT_ID", "asst_1").expect("append should succeed");

        let contents = fs::read_to_string(&path).expect("read env file");
        assert_eq!(contents, "PROJECT_ENDPOINT=https://proj.example.com\nEXEMPT_AGENT_ID=asst_1");
    }

    #[test]
    fn read_returns_last_entry_for_key() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join(".env");

        append_env_entry(&path, "EXEMPT_AGENT_ID", "asst_old").expect("first append");
        append_env_entry(&path, "EXEMPT_AGENT_ID", "asst_new").expect("second append");

        let value = read_env_entry(&path, "EXEMPT_AGENT_ID").expect("read should succeed");
        assert_eq!(value.as_deref(), Some("asst_new"));
    }

    #[test]
    fn read_missing_file_is_none() {
        let dir = TempDir::new().expect("temp dir");
        let value = read_env_entry(&dir.path().join(".env"), "EXEMPT_AGENT_ID")
            .expect("missing file is not an error");
        assert_eq!(value, None);
    }
}
