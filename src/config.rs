//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione dell'applicazione.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` con tutti i parametri della pipeline remota
//! - Fornisce validazione robusta dei parametri di input
//! - Supporta caricamento/salvataggio configurazione da/verso file JSON
//! - Risolve i path di configurazione e cache (`ConfigPaths`)
//!
//! ## Parametri di configurazione:
//! - `jpeg_quality`: Qualità JPEG (1-100, default: 80)
//! - `max_width` / `max_height`: Limiti di resize (0 = illimitato)
//! - `size_threshold`: Soglia per sostituire file (0.0-1.0, default: 0.9)
//! - `min_file_size`: Dimensione minima dei file da selezionare (default: 0)
//! - `concurrency`: File in volo contemporaneamente (default: 4)
//! - `cache_ttl_secs`: TTL della cache delle directory (default: 120)
//! - `skip_cache`: Ignora la cache delle directory
//! - `recursive`: Scende nelle sottodirectory remote
//! - `audit`: File JSON di audit (default: None)
//! - `json_output`: Output JSON per uso programmatico
//!
//! ## Esempio:
//! ```ignore
//! let config = Config {
//!     jpeg_quality: 85,
//!     concurrency: 8,
//!     ..Default::default()
//! };
//! config.validate()?;
//! ```

use crate::optimizer::OptimizeParams;
use crate::remotefs::ConnectionConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_DIR: &str = "remote-media-optimizer";

/// Configuration for remote media optimization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
    /// Max output width, 0 = unlimited
    pub max_width: u32,
    /// Max output height, 0 = unlimited
    pub max_height: u32,
    /// Size threshold (keep if new size < original * threshold)
    pub size_threshold: f64,
    /// Files smaller than this are not selected
    pub min_file_size: u64,
    /// Files processed at the same time
    pub concurrency: usize,
    /// Directory listing cache TTL in seconds
    pub cache_ttl_secs: u64,
    /// Always list from the remote
    pub skip_cache: bool,
    /// Descend into remote subdirectories
    pub recursive: bool,
    /// Audit file (JSON array of per-file records)
    pub audit: Option<PathBuf>,
    /// Output progress and status as JSON for programmatic use
    pub json_output: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            jpeg_quality: 80,
            max_width: 0,
            max_height: 0,
            size_threshold: 0.9,
            min_file_size: 0,
            concurrency: 4,
            cache_ttl_secs: 120,
            skip_cache: false,
            recursive: false,
            audit: None,
            json_output: false,
        }
    }
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err(anyhow::anyhow!("JPEG quality must be between 1 and 100"));
        }

        if self.size_threshold <= 0.0 || self.size_threshold > 1.0 {
            return Err(anyhow::anyhow!("Size threshold must be between 0.0 and 1.0"));
        }

        if let Some(ref audit) = self.audit {
            if audit.is_dir() {
                return Err(anyhow::anyhow!("Audit path is a directory: {}", audit.display()));
            }
        }

        Ok(())
    }

    /// Parametri passati all'ottimizzatore per ogni file
    pub fn optimize_params(&self) -> OptimizeParams {
        OptimizeParams {
            quality: self.jpeg_quality,
            max_width: self.max_width,
            max_height: self.max_height,
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Load configuration from file
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}

/// Parse size string like "100KB", "5MB", "1GB" (plain numbers are bytes)
pub fn parse_size(input: &str) -> Result<u64> {
    let input = input.trim().to_uppercase();
    let split = input
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(input.len());
    let (number, unit) = input.split_at(split);

    let value: f64 = number
        .parse()
        .with_context(|| format!("Invalid size: {}", input))?;
    let multiplier: u64 = match unit.trim() {
        "" | "B" => 1,
        "KB" | "K" => 1024,
        "MB" | "M" => 1024 * 1024,
        "GB" | "G" => 1024 * 1024 * 1024,
        other => return Err(anyhow::anyhow!("Unknown size unit: {}", other)),
    };

    let bytes = value * multiplier as f64;
    if !bytes.is_finite() || bytes >= u64::MAX as f64 {
        return Err(anyhow::anyhow!("Size out of range: {}", input));
    }
    Ok(bytes as u64)
}

/// Parse a duration like "90s", "2m", "1h" (plain numbers are seconds)
pub fn parse_ttl(input: &str) -> Result<Duration> {
    let input = input.trim().to_lowercase();
    let split = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    let (number, unit) = input.split_at(split);

    let value: u64 = number
        .parse()
        .with_context(|| format!("Invalid duration: {}", input))?;
    let multiplier: u64 = match unit.trim() {
        "" | "s" => 1,
        "m" => 60,
        "h" => 3600,
        other => return Err(anyhow::anyhow!("Unknown duration unit: {}", other)),
    };
    let seconds = value
        .checked_mul(multiplier)
        .with_context(|| format!("Duration out of range: {}", input))?;

    Ok(Duration::from_secs(seconds))
}

/// Path di configurazione e cache dell'applicazione
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigPaths {
    pub config_file: PathBuf,
    pub cache_file: PathBuf,
}

impl ConfigPaths {
    /// Risolve i path per un endpoint remoto
    pub fn resolve(connection: &ConnectionConfig) -> Result<Self> {
        let config_dir = dirs::config_dir()
            .or_else(dirs::home_dir)
            .context("Cannot determine config directory")?;
        let cache_dir = dirs::cache_dir()
            .or_else(dirs::home_dir)
            .context("Cannot determine cache directory")?;
        Ok(Self::under(&config_dir, &cache_dir, connection))
    }

    pub fn under(config_dir: &Path, cache_dir: &Path, connection: &ConnectionConfig) -> Self {
        Self {
            config_file: config_dir.join(APP_DIR).join("config.json"),
            cache_file: cache_dir
                .join(APP_DIR)
                .join(format!("dircache_{}.db", Self::endpoint_hash(connection))),
        }
    }

    /// Hash stabile di `user@host:port/root`, primi 16 caratteri esadecimali
    pub fn endpoint_hash(connection: &ConnectionConfig) -> String {
        let endpoint = format!(
            "{}@{}:{}/{}",
            connection.user, connection.host, connection.port, connection.remote_path
        );
        let mut hasher = Sha256::new();
        hasher.update(endpoint.as_bytes());
        hex::encode(hasher.finalize())[..16].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.jpeg_quality = 0;
        assert!(config.validate().is_err());

        config.jpeg_quality = 80;
        config.size_threshold = 1.5;
        assert!(config.validate().is_err());

        config.size_threshold = 0.9;
        config.concurrency = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.jpeg_quality, 80);
        assert_eq!(config.size_threshold, 0.9);
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.cache_ttl(), Duration::from_secs(120));
        assert!(!config.skip_cache);
        assert!(config.audit.is_none());
    }

    #[tokio::test]
    async fn test_config_save_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested/config.json");

        let original_config = Config {
            jpeg_quality: 85,
            max_width: 1920,
            size_threshold: 0.85,
            concurrency: 8,
            recursive: true,
            ..Default::default()
        };

        original_config.save_to_file(&config_path).await.unwrap();
        let loaded_config = Config::from_file(&config_path).await.unwrap();

        assert_eq!(loaded_config, original_config);
    }

    #[tokio::test]
    async fn test_partial_config_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        tokio::fs::write(&config_path, r#"{"jpeg_quality": 60}"#).await.unwrap();

        let config = Config::from_file(&config_path).await.unwrap();
        assert_eq!(config.jpeg_quality, 60);
        assert_eq!(config.concurrency, 4);
    }

    #[tokio::test]
    async fn test_missing_config_is_default() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::from_file(&temp_dir.path().join("absent.json")).await.unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("500").unwrap(), 500);
        assert_eq!(parse_size("500KB").unwrap(), 500 * 1024);
        assert_eq!(parse_size("2mb").unwrap(), 2 * 1024 * 1024);
        assert_eq!(parse_size("1.5K").unwrap(), 1536);
        assert!(parse_size("10XB").is_err());
        assert!(parse_size("MB").is_err());
    }

    #[test]
    fn test_parse_ttl() {
        assert_eq!(parse_ttl("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_ttl("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_ttl("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_ttl("45").unwrap(), Duration::from_secs(45));
        assert!(parse_ttl("3d").is_err());
    }

    #[test]
    fn test_parsers_reject_overflow() {
        assert!(parse_ttl("18446744073709551615h").is_err());
        assert!(parse_ttl("6000000000000000m").is_err());
        assert_eq!(
            parse_ttl("18446744073709551615").unwrap(),
            Duration::from_secs(u64::MAX)
        );
        assert!(parse_size("99999999999999999999GB").is_err());
        assert!(parse_size(&format!("{}KB", "9".repeat(400))).is_err());
    }

    #[test]
    fn test_cache_file_is_per_endpoint() {
        let base = Path::new("/base");
        let a = ConnectionConfig {
            host: "a.example".to_string(),
            port: 22,
            user: "me".to_string(),
            remote_path: "/srv/photos".to_string(),
            ..Default::default()
        };
        let b = ConnectionConfig {
            host: "b.example".to_string(),
            ..a.clone()
        };

        let paths_a = ConfigPaths::under(base, base, &a);
        let paths_b = ConfigPaths::under(base, base, &b);
        assert_ne!(paths_a.cache_file, paths_b.cache_file);
        assert_eq!(paths_a, ConfigPaths::under(base, base, &a));
        assert_eq!(ConfigPaths::endpoint_hash(&a).len(), 16);
        assert_eq!(paths_a.config_file, PathBuf::from("/base/remote-media-optimizer/config.json"));
    }
}
