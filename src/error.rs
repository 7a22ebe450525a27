//! Error types for the API Banking SOAP client layer.
//!
//! These are configuration-time failures. Failures of a remote call are not
//! represented here; they are translated into a [`Fault`](crate::fault::Fault).

use std::path::PathBuf;
use thiserror::Error;

/// Client layer errors.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to load client certificate {}: {reason}", path.display())]
    CertificateLoad { path: PathBuf, reason: String },

    #[error("Invalid header {name}: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("XML parsing error: {0}")]
    XmlParse(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    pub(crate) fn certificate(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::CertificateLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_certificate_error_display() {
        let err = Error::certificate("/etc/ybl/client.p12", "bad password");
        assert_eq!(
            err.to_string(),
            "Failed to load client certificate /etc/ybl/client.p12: bad password"
        );
    }
}
