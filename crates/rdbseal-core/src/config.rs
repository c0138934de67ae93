use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{RdbsealError, RdbsealResult};
use crate::types::{Framing, LogFormat};

/// Default plaintext chunk size in bytes (4 KiB)
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Largest chunk size accepted from config, flags, or a manifest (1 GiB)
pub const MAX_CHUNK_SIZE: usize = 1 << 30;

/// Top-level configuration (loaded from rdbseal.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RdbsealConfig {
    pub crypto: CryptoConfig,
    pub files: FileConfig,
    pub logging: LoggingConfig,
}

/// Encryption engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Base64-encoded 256-bit AES key. Never written back out.
    #[serde(skip_serializing)]
    pub encryption_key: Option<String>,
    /// Plaintext bytes per chunk for the chunked framings (default: 4096)
    pub chunk_size: usize,
    /// Default framing for `encrypt` (default: package)
    pub framing: Framing,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            encryption_key: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            framing: Framing::default(),
        }
    }
}

/// Output naming for snapshot files
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Default name for encrypted output (default: dump.rdb.crypt)
    pub encrypted_file_name: String,
    /// Default name for decrypted output (default: dump.rdb.dcrypt)
    pub decrypted_file_name: String,
    /// Suffix appended to the ciphertext path for the manifest sidecar
    pub manifest_suffix: String,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            encrypted_file_name: "dump.rdb.crypt".into(),
            decrypted_file_name: "dump.rdb.dcrypt".into(),
            manifest_suffix: ".manifest.json".into(),
        }
    }
}

impl FileConfig {
    /// Sidecar manifest path for a given ciphertext file.
    pub fn manifest_path_for(&self, ciphertext: &Path) -> PathBuf {
        let mut name = ciphertext.as_os_str().to_os_string();
        name.push(&self.manifest_suffix);
        PathBuf::from(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Text,
        }
    }
}

impl RdbsealConfig {
    pub fn from_toml_str(s: &str) -> RdbsealResult<Self> {
        let config: RdbsealConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> RdbsealResult<Self> {
        if !path.exists() {
            tracing::warn!("config file not found: {}  (using defaults)", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> RdbsealResult<()> {
        if self.crypto.chunk_size == 0 {
            return Err(RdbsealError::Config("crypto.chunk_size must be non-zero".into()));
        }
        if self.crypto.chunk_size > MAX_CHUNK_SIZE {
            return Err(RdbsealError::Config(format!(
                "crypto.chunk_size {} exceeds the maximum of {MAX_CHUNK_SIZE}",
                self.crypto.chunk_size
            )));
        }
        if self.files.manifest_suffix.is_empty() {
            return Err(RdbsealError::Config(
                "files.manifest_suffix must not be empty".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[crypto]
encryption_key = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA="
chunk_size = 8192
framing = "package-fitted"

[files]
encrypted_file_name = "snap.crypt"
decrypted_file_name = "snap.plain"
manifest_suffix = ".nonces.json"

[logging]
level = "debug"
format = "json"
"#;
        let config = RdbsealConfig::from_toml_str(toml_str).unwrap();

        assert_eq!(
            config.crypto.encryption_key.as_deref(),
            Some("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=")
        );
        assert_eq!(config.crypto.chunk_size, 8192);
        assert_eq!(config.crypto.framing, Framing::PackageFitted);
        assert_eq!(config.files.encrypted_file_name, "snap.crypt");
        assert_eq!(config.files.manifest_suffix, ".nonces.json");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_parse_defaults() {
        let config = RdbsealConfig::from_toml_str("").unwrap();

        assert!(config.crypto.encryption_key.is_none());
        assert_eq!(config.crypto.chunk_size, 4096);
        assert_eq!(config.crypto.framing, Framing::Package);
        assert_eq!(config.files.encrypted_file_name, "dump.rdb.crypt");
        assert_eq!(config.files.decrypted_file_name, "dump.rdb.dcrypt");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
[crypto]
framing = "split"
"#;
        let config = RdbsealConfig::from_toml_str(toml_str).unwrap();

        // Overridden
        assert_eq!(config.crypto.framing, Framing::Split);
        // Defaults
        assert_eq!(config.crypto.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.files.manifest_suffix, ".manifest.json");
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let err = RdbsealConfig::from_toml_str("[crypto]\nchunk_size = 0\n").unwrap_err();
        assert!(matches!(err, RdbsealError::Config(_)));
    }

    #[test]
    fn test_oversized_chunk_size_rejected() {
        let toml_str = format!("[crypto]\nchunk_size = {}\n", MAX_CHUNK_SIZE + 1);
        let err = RdbsealConfig::from_toml_str(&toml_str).unwrap_err();
        assert!(matches!(err, RdbsealError::Config(_)));

        let toml_str = format!("[crypto]\nchunk_size = {MAX_CHUNK_SIZE}\n");
        assert!(RdbsealConfig::from_toml_str(&toml_str).is_ok());
    }

    #[test]
    fn test_unknown_framing_rejected() {
        let err = RdbsealConfig::from_toml_str("[crypto]\nframing = \"zip\"\n").unwrap_err();
        assert!(matches!(err, RdbsealError::Toml(_)));
    }

    #[test]
    fn test_serialize_omits_key() {
        let mut config = RdbsealConfig::default();
        config.crypto.encryption_key = Some("c2VjcmV0".into());
        let toml_str = toml::to_string(&config).unwrap();

        assert!(!toml_str.contains("c2VjcmV0"));
        let parsed = RdbsealConfig::from_toml_str(&toml_str).unwrap();
        assert!(parsed.crypto.encryption_key.is_none());
        assert_eq!(parsed.crypto.chunk_size, config.crypto.chunk_size);
        assert_eq!(parsed.files.encrypted_file_name, config.files.encrypted_file_name);
    }

    #[test]
    fn test_manifest_path_for() {
        let files = FileConfig::default();
        let path = files.manifest_path_for(Path::new("/tmp/dump.rdb.crypt"));
        assert_eq!(path, PathBuf::from("/tmp/dump.rdb.crypt.manifest.json"));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = RdbsealConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.crypto.chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rdbseal.toml");
        std::fs::write(&path, "[logging]\nlevel = \"warn\"\n").unwrap();

        let config = RdbsealConfig::load(&path).unwrap();
        assert_eq!(config.logging.level, "warn");
    }
}
