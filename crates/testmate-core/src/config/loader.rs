//! Configuration file discovery and loading

use super::testmate_config::TestmateConfig;
use crate::error::TestmateError;
use crate::result::Result;
use std::path::{Path, PathBuf};

/// Config file names in priority order
pub const CONFIG_FILE_NAMES: &[&str] = &[
    ".testmaterc.json",
    ".testmaterc.toml",
    "testmate.yaml",
    "testmate.yml",
    "testmate.json",
];

/// Configuration loader for discovering and loading config files
pub struct ConfigLoader;

impl ConfigLoader {
    /// Auto-discover config file by traversing upward from start_path
    ///
    /// Starts from the given directory and moves up the directory tree until
    /// a config is found or the filesystem root is reached.
    pub fn auto_discover(start_path: &Path) -> Result<Option<PathBuf>> {
        let mut current = start_path
            .canonicalize()
            .map_err(|e| TestmateError::config_error(format!("Invalid path: {e}")))?;

        loop {
            for filename in CONFIG_FILE_NAMES {
                let config_path = current.join(filename);
                if config_path.is_file() {
                    tracing::debug!("Found config: {}", config_path.display());
                    return Ok(Some(config_path));
                }
            }

            if let Some(parent) = current.parent() {
                current = parent.to_path_buf();
            } else {
                break;
            }
        }

        Ok(None)
    }

    /// Load and validate configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<TestmateConfig> {
        let config = TestmateConfig::load(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from an explicit path, or auto-discover one starting at
    /// `start_dir`; falls back to the default configuration when nothing is found
    pub fn load(custom_path: Option<&Path>, start_dir: &Path) -> Result<TestmateConfig> {
        if let Some(path) = custom_path {
            if !path.exists() {
                return Err(TestmateError::config_error(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            return Self::load_from_file(path);
        }

        match Self::auto_discover(start_dir)? {
            Some(found) => Self::load_from_file(&found),
            None => {
                tracing::debug!(
                    "No config file found from {}, using defaults",
                    start_dir.display()
                );
                Ok(TestmateConfig::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_temp_config(dir: &Path, filename: &str, content: &str) -> PathBuf {
        let path = dir.join(filename);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_from_file_json() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = create_temp_config(
            temp_dir.path(),
            "testmate.json",
            r#"{ "execution": { "parallelJobs": 3 } }"#,
        );

        let config = ConfigLoader::load_from_file(&config_path).unwrap();
        assert_eq!(config.parallel_jobs(), 3);
    }

    #[test]
    fn test_auto_discover_from_nested_dir() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("build/debug");
        fs::create_dir_all(&nested).unwrap();
        create_temp_config(temp_dir.path(), "testmate.yaml", "executables: []\n");

        let found = ConfigLoader::auto_discover(&nested).unwrap();
        assert_eq!(found.unwrap().file_name().unwrap(), "testmate.yaml");
    }

    #[test]
    fn test_auto_discover_priority() {
        let temp_dir = TempDir::new().unwrap();
        create_temp_config(temp_dir.path(), "testmate.json", "{}");
        create_temp_config(temp_dir.path(), ".testmaterc.toml", "");

        let found = ConfigLoader::auto_discover(temp_dir.path()).unwrap();
        assert_eq!(found.unwrap().file_name().unwrap(), ".testmaterc.toml");
    }

    #[test]
    fn test_load_invalid_json() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = create_temp_config(temp_dir.path(), "bad.json", "{ invalid json }");
        assert!(ConfigLoader::load_from_file(&config_path).is_err());
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = create_temp_config(
            temp_dir.path(),
            "testmate.json",
            r#"{ "execution": { "parallelJobs": 0 } }"#,
        );
        assert!(ConfigLoader::load_from_file(&config_path).is_err());
    }

    #[test]
    fn test_load_missing_explicit_path() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nope.json");
        assert!(ConfigLoader::load(Some(&missing), temp_dir.path()).is_err());
    }
}
