use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures on the advertising path.
///
/// None of these ever reach the viewer: the runner absorbs them, logs a
/// warning and reports a `false` outcome so content can proceed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdError {
    #[error("ad SDK is not available")]
    SdkUnavailable,
    #[error("ad request failed: {0}")]
    Request(String),
    #[error("ad playback failed: {0}")]
    Playback(String),
    #[error("ad did not finish within {0:?}")]
    Timeout(Duration),
    #[error("no media element found after {attempts} attempts")]
    MediaElementNotFound { attempts: u32 },
    #[error("ad SDK closed the session without a terminal event")]
    StreamClosed,
    #[error("ad session cancelled")]
    Cancelled,
}

/// Live channel failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LiveError {
    #[error("live channel has no playable entries")]
    QueueEmpty,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("content '{id}' is not in the catalog")]
    UnknownContent { id: String },
    #[error("content '{id}' has no playable reference")]
    NoPlayableReference { id: String },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ad_error_messages_are_readable() {
        assert_eq!(
            AdError::MediaElementNotFound { attempts: 12 }.to_string(),
            "no media element found after 12 attempts"
        );
        assert!(AdError::Timeout(Duration::from_secs(20)).to_string().contains("20s"));
    }

    #[test]
    fn session_error_wraps_config_error() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: SessionError = ConfigError::Io {
            path: PathBuf::from("config.json"),
            source: io,
        }
        .into();
        assert!(err.to_string().contains("config.json"));
    }
}
