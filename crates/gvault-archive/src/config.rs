use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use gvault_hash::CanonicalHasher;
use gvault_store::RetryPolicy;

use crate::error::{ArchiveError, ArchiveResult};

/// Archive layout version written by this crate.
pub const FORMAT_VERSION: u32 = 1;

/// Per-archive settings, stored as `archive.toml` at the archive root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub format_version: u32,
    /// Quantization policy the archive's digests were computed with.
    pub quantization_version: u8,
    pub io_retry_attempts: u32,
    pub io_retry_backoff_ms: u64,
    /// Whether `flush` forces segment data to stable storage.
    pub sync_on_flush: bool,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            format_version: FORMAT_VERSION,
            quantization_version: gvault_hash::QUANTIZATION_VERSION,
            io_retry_attempts: 3,
            io_retry_backoff_ms: 50,
            sync_on_flush: true,
        }
    }
}

impl ArchiveConfig {
    pub fn load(path: &Path) -> ArchiveResult<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let root = path.parent().unwrap_or(path);
                return Err(ArchiveError::NotAnArchive(root.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };
        toml::from_str(&text).map_err(|e| ArchiveError::Config(e.to_string()))
    }

    pub fn save(&self, path: &Path) -> ArchiveResult<()> {
        let text = toml::to_string_pretty(self).map_err(|e| ArchiveError::Config(e.to_string()))?;
        fs::write(path, text)?;
        Ok(())
    }

    /// Check the versions and build the hasher they call for.
    pub fn hasher(&self) -> ArchiveResult<CanonicalHasher> {
        if self.format_version != FORMAT_VERSION {
            return Err(ArchiveError::Config(format!(
                "unsupported archive format version {}",
                self.format_version
            )));
        }
        Ok(CanonicalHasher::for_version(self.quantization_version)?)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.io_retry_attempts,
            backoff: Duration::from_millis(self.io_retry_backoff_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gvault_hash::HashError;

    #[test]
    fn default_config() {
        let c = ArchiveConfig::default();
        assert_eq!(c.format_version, 1);
        assert_eq!(c.quantization_version, 1);
        assert_eq!(c.io_retry_attempts, 3);
        assert!(c.sync_on_flush);
        assert_eq!(c.retry_policy().backoff, Duration::from_millis(50));
    }

    #[test]
    fn toml_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("archive.toml");
        let c = ArchiveConfig {
            sync_on_flush: false,
            ..ArchiveConfig::default()
        };
        c.save(&path).unwrap();
        assert_eq!(ArchiveConfig::load(&path).unwrap(), c);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let c: ArchiveConfig = toml::from_str("io_retry_attempts = 7\n").unwrap();
        assert_eq!(c.io_retry_attempts, 7);
        assert_eq!(c.format_version, FORMAT_VERSION);
    }

    #[test]
    fn unknown_versions_are_rejected() {
        let c = ArchiveConfig {
            format_version: 9,
            ..ArchiveConfig::default()
        };
        assert!(matches!(c.hasher(), Err(ArchiveError::Config(_))));

        let c = ArchiveConfig {
            quantization_version: 4,
            ..ArchiveConfig::default()
        };
        assert!(matches!(
            c.hasher(),
            Err(ArchiveError::Hash(HashError::UnsupportedQuantization(4)))
        ));
    }

    #[test]
    fn missing_file_is_not_an_archive() {
        let dir = tempfile::tempdir().unwrap();
        let err = ArchiveConfig::load(&dir.path().join("archive.toml")).unwrap_err();
        assert!(matches!(err, ArchiveError::NotAnArchive(_)));
    }
}
