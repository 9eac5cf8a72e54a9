//! # Error Types Module
//!
//! Centralized error handling for the spark monitor.
//! Provides custom error types for each module with proper context and error chaining.
//!
//! ## Error Types
//! - `LinkError`: Sensor link open and read failures
//! - `ConfigError`: Configuration file I/O and parsing errors
//! - `PersistError`: Directory creation and file write failures (hitrate, snapshot, signal)
//! - `SessionError`: Failures that stop the acquisition session
//!
//! ## Fatal vs Recoverable
//! Config errors, any `LinkError`, and a `PersistError` from the session
//! start or the final forced flush end the process. Every other
//! `PersistError` is logged and the acquisition loop keeps running. Malformed records are not errors
//! at all; see `link::DiscardReason`.

use std::fmt;
use std::path::PathBuf;

/// Errors that can occur on the sensor link
#[derive(Debug)]
pub enum LinkError {
    /// The link device could not be opened at startup
    Unavailable { path: PathBuf, source: std::io::Error },
    /// A read from an open link failed
    Read(std::io::Error),
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkError::Unavailable { path, source } => {
                write!(f, "Sensor link {} unavailable: {}", path.display(), source)
            }
            LinkError::Read(e) => {
                write!(f, "Failed to read from sensor link: {}", e)
            }
        }
    }
}

impl std::error::Error for LinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LinkError::Unavailable { source, .. } => Some(source),
            LinkError::Read(e) => Some(e),
        }
    }
}

/// Errors that can occur during configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read config file
    ReadFailed(std::io::Error),
    /// Failed to write config file
    WriteFailed(std::io::Error),
    /// Failed to parse config file
    ParseFailed(toml::de::Error),
    /// Failed to serialize config
    SerializeFailed(toml::ser::Error),
    /// Config parsed but holds values the session cannot run with
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ReadFailed(e) => {
                write!(f, "Failed to read config file: {}", e)
            }
            ConfigError::WriteFailed(e) => {
                write!(f, "Failed to write config file: {}", e)
            }
            ConfigError::ParseFailed(e) => {
                write!(f, "Failed to parse config file: {}", e)
            }
            ConfigError::SerializeFailed(e) => {
                write!(f, "Failed to serialize config: {}", e)
            }
            ConfigError::Invalid(msg) => {
                write!(f, "Invalid configuration: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::ReadFailed(e) => Some(e),
            ConfigError::WriteFailed(e) => Some(e),
            ConfigError::ParseFailed(e) => Some(e),
            ConfigError::SerializeFailed(e) => Some(e),
            ConfigError::Invalid(_) => None,
        }
    }
}

/// Errors that can occur while writing monitor output to disk
#[derive(Debug)]
pub enum PersistError {
    /// Failed to create an output directory
    CreateDir { path: PathBuf, source: std::io::Error },
    /// Failed to write an output file
    Write { path: PathBuf, source: std::io::Error },
    /// Failed to read back a previously written file
    Read { path: PathBuf, source: std::io::Error },
}

impl fmt::Display for PersistError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistError::CreateDir { path, source } => {
                write!(f, "Failed to create directory {}: {}", path.display(), source)
            }
            PersistError::Write { path, source } => {
                write!(f, "Failed to write {}: {}", path.display(), source)
            }
            PersistError::Read { path, source } => {
                write!(f, "Failed to read {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for PersistError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PersistError::CreateDir { source, .. }
            | PersistError::Write { source, .. }
            | PersistError::Read { source, .. } => Some(source),
        }
    }
}

/// Errors that end an acquisition session
#[derive(Debug)]
pub enum SessionError {
    Config(ConfigError),
    Link(LinkError),
    /// Startup directory creation or the final forced flush failed
    Persist(PersistError),
    /// A worker thread could not be started
    Spawn(std::io::Error),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Config(e) => write!(f, "{}", e),
            SessionError::Link(e) => write!(f, "{}", e),
            SessionError::Persist(e) => write!(f, "{}", e),
            SessionError::Spawn(e) => write!(f, "Failed to start worker thread: {}", e),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Config(e) => Some(e),
            SessionError::Link(e) => Some(e),
            SessionError::Persist(e) => Some(e),
            SessionError::Spawn(e) => Some(e),
        }
    }
}

impl From<ConfigError> for SessionError {
    fn from(e: ConfigError) -> Self {
        SessionError::Config(e)
    }
}

impl From<LinkError> for SessionError {
    fn from(e: LinkError) -> Self {
        SessionError::Link(e)
    }
}

impl From<PersistError> for SessionError {
    fn from(e: PersistError) -> Self {
        SessionError::Persist(e)
    }
}
