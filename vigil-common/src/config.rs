//! Bootstrap configuration loading and root folder resolution
//!
//! Two-tier configuration:
//! 1. **TOML bootstrap** (this module): port, root folder, capture, classifier,
//!    upload limits, notification transports, logging. Static; restart to change.
//! 2. **Database runtime**: pipeline settings in the `settings` table,
//!    mutable while running via control events.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable consulted for the root folder
pub const ROOT_FOLDER_ENV: &str = "VIGIL_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "vigil.db";

/// Media (uploads, clips, snapshots) directory inside the root folder
pub const UPLOADS_DIR: &str = "uploads";

/// Bootstrap configuration loaded from TOML file
///
/// Every field has a built-in default, so a missing or partial file
/// still produces a usable configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// HTTP server port
    pub port: u16,

    /// Root folder holding the database and uploads directory
    pub root_folder: Option<PathBuf>,

    /// Capture cadence in frames per second
    pub frame_rate: u32,

    /// Detection queue capacity (pending sequences)
    pub queue_capacity: usize,

    pub capture: CaptureConfig,
    pub classifier: ClassifierConfig,
    pub upload: UploadConfig,
    pub email: EmailConfig,
    pub sms: SmsConfig,
    pub logging: LoggingConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            port: 5750,
            root_folder: None,
            frame_rate: 30,
            queue_capacity: 4,
            capture: CaptureConfig::default(),
            classifier: ClassifierConfig::default(),
            upload: UploadConfig::default(),
            email: EmailConfig::default(),
            sms: SmsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Frame capture backend configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Path or name of the ffmpeg executable
    pub ffmpeg_path: String,
    /// Webcam device (e.g. /dev/video0 on Linux)
    pub webcam_device: String,
    /// Output frame width in pixels
    pub width: u32,
    /// Output frame height in pixels
    pub height: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            webcam_device: default_webcam_device(),
            width: 640,
            height: 480,
        }
    }
}

fn default_webcam_device() -> String {
    if cfg!(target_os = "linux") {
        "/dev/video0".to_string()
    } else {
        "0".to_string()
    }
}

/// Sequence classifier endpoint configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Base URL of the model server
    pub url: String,
    /// Model name on the server
    pub model: String,
    /// Channel order the model was trained with ("bgr" or "rgb")
    pub channel_order: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8501".to_string(),
            model: "lrcn".to_string(),
            channel_order: "bgr".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Video upload ingress limits
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Hard size cap in bytes
    pub max_bytes: usize,
    /// Lower-case extensions including the leading dot
    pub allowed_extensions: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: 100 * 1024 * 1024,
            allowed_extensions: vec![".mp4".to_string(), ".avi".to_string(), ".mov".to_string()],
        }
    }
}

/// Email transport (HTTP mail relay) configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub relay_url: Option<String>,
    pub api_key: Option<String>,
    pub from: Option<String>,
    pub recipients: Vec<String>,
}

/// SMS transport (Twilio) configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SmsConfig {
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    pub from_number: Option<String>,
    pub to_number: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load configuration from an explicit file path
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Cannot read {}: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&text)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load configuration from an explicit path, or the platform default location.
    ///
    /// A missing default file is not an error: built-in defaults are used.
    /// An explicit path that cannot be read or parsed is an error.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        match default_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => {
                warn!("No configuration file found, using built-in defaults");
                Ok(Self::default())
            }
        }
    }
}

/// Platform configuration file location (~/.config/vigil/config.toml on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("vigil").join("config.toml"))
}

/// Root folder resolution, highest priority first:
/// 1. Command-line argument
/// 2. Environment variable (VIGIL_ROOT_FOLDER)
/// 3. TOML config `root_folder`
/// 4. OS-dependent compiled default
pub fn resolve_root_folder(cli_arg: Option<&Path>, toml_value: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = toml_value {
        return path.to_path_buf();
    }

    default_root_folder()
}

/// Get OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("vigil"))
        .unwrap_or_else(|| PathBuf::from("./vigil_data"))
}

/// Ensure the root folder and its uploads directory exist
pub fn prepare_root_folder(root: &Path) -> Result<PathBuf> {
    let uploads = root.join(UPLOADS_DIR);
    std::fs::create_dir_all(&uploads)?;
    Ok(uploads)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_file_content() {
        let config = TomlConfig::from_toml_str("").unwrap();
        assert_eq!(config.port, 5750);
        assert_eq!(config.frame_rate, 30);
        assert_eq!(config.upload.max_bytes, 100 * 1024 * 1024);
        assert_eq!(config.classifier.channel_order, "bgr");
        assert!(config.email.recipients.is_empty());
    }

    #[test]
    fn test_partial_sections_keep_defaults() {
        let config = TomlConfig::from_toml_str(
            r#"
            port = 6000

            [capture]
            width = 320

            [email]
            recipients = ["ops@example.com"]
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 6000);
        assert_eq!(config.capture.width, 320);
        assert_eq!(config.capture.height, 480);
        assert_eq!(config.email.recipients, vec!["ops@example.com".to_string()]);
    }

    #[test]
    fn test_invalid_toml_is_rejected() {
        let result = TomlConfig::from_toml_str("port = \"not a number\"");
        assert!(matches!(result, Err(Error::Toml(_))));
    }

    #[test]
    fn test_cli_argument_wins() {
        let resolved = resolve_root_folder(
            Some(Path::new("/tmp/from-cli")),
            Some(Path::new("/tmp/from-toml")),
        );
        assert_eq!(resolved, PathBuf::from("/tmp/from-cli"));
    }

    #[test]
    fn test_prepare_root_folder_creates_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = prepare_root_folder(dir.path()).unwrap();
        assert!(uploads.is_dir());
        assert_eq!(uploads, dir.path().join(UPLOADS_DIR));
    }
}
