//! Error types for minipd

use crate::proto::pdpb;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === I/O Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Transport Errors ===
    #[error("gRPC error: {0}")]
    Grpc(#[from] tonic::Status),

    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    // === Cluster Errors ===
    #[error("PD cluster error ({kind:?}): {message}")]
    Cluster {
        kind: pdpb::ErrorType,
        message: String,
    },

    #[error("No PD leader available")]
    NoLeader,

    #[error("Invalid member URL: {0}")]
    InvalidUrl(String),

    // === Lifecycle Errors ===
    #[error("Initialization failed: {0}")]
    Init(String),

    #[error("Wait interrupted")]
    Interrupted,

    #[error("Client closed")]
    Closed,

    // === Codec Errors ===
    #[error("Corrupted data: {0}")]
    Corrupted(String),

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    // === Generic ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Is this a retryable error?
    ///
    /// Transport failures (deadlines included) and errors reported in a PD
    /// response header are worth a failover and another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Grpc(_) | Error::Transport(_) | Error::Cluster { .. } | Error::NoLeader
        )
    }

    /// Builds a cluster error from the error carried by a response header.
    pub fn cluster(err: &pdpb::Error) -> Self {
        Error::Cluster {
            kind: err.r#type(),
            message: err.message.clone(),
        }
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}
