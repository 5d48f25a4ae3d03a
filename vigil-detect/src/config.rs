//! vigil-detect configuration
//!
//! Command-line flags (with environment fallbacks) layered over the TOML
//! bootstrap file, resolved once at startup into an immutable [`Config`].

use crate::error::{Error, Result};
use crate::pipeline::frame::ChannelOrder;
use clap::Parser;
use std::path::PathBuf;
use vigil_common::config::{
    prepare_root_folder, resolve_root_folder, CaptureConfig, ClassifierConfig, EmailConfig,
    SmsConfig, TomlConfig, UploadConfig, DATABASE_FILE,
};

/// Command-line arguments for vigil-detect
#[derive(Parser, Debug, Default)]
#[command(name = "vigil-detect")]
#[command(about = "Real-time video behavior detection and alerting")]
#[command(version)]
pub struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "VIGIL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "VIGIL_PORT")]
    pub port: Option<u16>,

    /// Root folder holding vigil.db and uploads/
    #[arg(short, long)]
    pub root_folder: Option<PathBuf>,

    /// Model server base URL
    #[arg(long, env = "VIGIL_CLASSIFIER_URL")]
    pub classifier_url: Option<String>,

    /// Mail relay API key
    #[arg(long, env = "VIGIL_EMAIL_API_KEY", hide_env_values = true)]
    pub email_api_key: Option<String>,

    /// Twilio account SID
    #[arg(long, env = "VIGIL_TWILIO_ACCOUNT_SID")]
    pub twilio_account_sid: Option<String>,

    /// Twilio auth token
    #[arg(long, env = "VIGIL_TWILIO_AUTH_TOKEN", hide_env_values = true)]
    pub twilio_auth_token: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "VIGIL_LOG_LEVEL")]
    pub log_level: Option<String>,
}

/// Resolved service configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub root_folder: PathBuf,
    pub db_path: PathBuf,
    pub uploads_dir: PathBuf,
    pub frame_rate: u32,
    pub queue_capacity: usize,
    pub channel_order: ChannelOrder,
    pub capture: CaptureConfig,
    pub classifier: ClassifierConfig,
    pub upload: UploadConfig,
    pub email: EmailConfig,
    pub sms: SmsConfig,
    pub log_level: String,
}

impl Config {
    /// Merge CLI over TOML over defaults, validate, and create the root folder
    pub fn resolve(cli: &Cli) -> Result<Self> {
        let toml = TomlConfig::load_or_default(cli.config.as_deref())?;
        let mut config = Self::merge(cli, toml)?;
        config.uploads_dir = prepare_root_folder(&config.root_folder)?;
        Ok(config)
    }

    /// Pure merge step (no filesystem access beyond env lookup)
    pub fn merge(cli: &Cli, toml: TomlConfig) -> Result<Self> {
        if toml.frame_rate == 0 {
            return Err(Error::Config("frame_rate must be greater than zero".into()));
        }
        if toml.queue_capacity == 0 {
            return Err(Error::Config("queue_capacity must be greater than zero".into()));
        }
        if toml.capture.width == 0 || toml.capture.height == 0 {
            return Err(Error::Config("capture width and height must be non-zero".into()));
        }

        let channel_order: ChannelOrder = toml
            .classifier
            .channel_order
            .parse()
            .map_err(Error::Config)?;

        let root_folder =
            resolve_root_folder(cli.root_folder.as_deref(), toml.root_folder.as_deref());

        let mut classifier = toml.classifier;
        if let Some(url) = &cli.classifier_url {
            classifier.url = url.clone();
        }

        let mut email = toml.email;
        if cli.email_api_key.is_some() {
            email.api_key = cli.email_api_key.clone();
        }

        let mut sms = toml.sms;
        if cli.twilio_account_sid.is_some() {
            sms.account_sid = cli.twilio_account_sid.clone();
        }
        if cli.twilio_auth_token.is_some() {
            sms.auth_token = cli.twilio_auth_token.clone();
        }

        Ok(Self {
            port: cli.port.unwrap_or(toml.port),
            db_path: root_folder.join(DATABASE_FILE),
            uploads_dir: root_folder.join(vigil_common::config::UPLOADS_DIR),
            root_folder,
            frame_rate: toml.frame_rate,
            queue_capacity: toml.queue_capacity,
            channel_order,
            capture: toml.capture,
            classifier,
            upload: toml.upload,
            email,
            sms,
            log_level: cli.log_level.clone().unwrap_or(toml.logging.level),
        })
    }
}
