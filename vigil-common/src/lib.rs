//! # Vigil Common Library
//!
//! Shared code for the Vigil detection service:
//! - Error type
//! - Bootstrap configuration and root folder resolution
//! - Database initialization (schema + default runtime settings)
//! - Broadcast event types (VigilEvent enum) and the EventBus

pub mod config;
pub mod db;
pub mod error;
pub mod events;

pub use error::{Error, Result};
