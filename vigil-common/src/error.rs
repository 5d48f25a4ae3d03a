//! Errors raised by the shared Vigil layer (bootstrap config, schema, models)

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file present but not valid TOML for [`crate::config::TomlConfig`]
    #[error("Invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    /// Bootstrap config unreadable or inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// Alert, clip or upload id that does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Stored or submitted value outside its allowed form
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_errors_convert() {
        let err: Error = toml::from_str::<toml::Value>("port = ").unwrap_err().into();
        assert!(matches!(err, Error::Toml(_)));
        assert!(err.to_string().starts_with("Invalid TOML"));
    }
}
