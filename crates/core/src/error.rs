/// Result alias that carries the custom [`BeatSyncError`] type.
pub type Result<T> = std::result::Result<T, BeatSyncError>;

/// Common error type for the core crate.
///
/// The enum is `Clone` so that one coalesced analysis failure can be handed
/// to every caller waiting on the same cache entry.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BeatSyncError {
    /// The audio container or codec is unsupported or corrupt.
    #[error("failed to decode audio: {0}")]
    Decode(String),
    /// The audio resource could not be retrieved.
    #[error("audio source unavailable: {0}")]
    SourceUnavailable(String),
    /// A parameter is out of range or names an unknown variant.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// Anything that does not fit the categories above, such as a poisoned
    /// lock or an aborted worker task.
    #[error("{0}")]
    Message(String),
}

impl BeatSyncError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    /// Shorthand for [`BeatSyncError::InvalidConfiguration`].
    pub fn invalid<T: Into<String>>(msg: T) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Returns `true` for analysis failures whose recovery is to carry on
    /// with an empty beat sequence.
    pub fn degrades_to_empty(&self) -> bool {
        matches!(self, Self::Decode(_) | Self::SourceUnavailable(_))
    }

    /// Message suitable for showing to the person editing the project.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Decode(_) => {
                "Failed to decode audio. The file might be corrupt or in an unsupported format."
            }
            Self::SourceUnavailable(_) => {
                "Failed to load audio file. Please check the network connection."
            }
            _ => "Could not analyze audio for beat detection.",
        }
    }
}

impl From<std::io::Error> for BeatSyncError {
    fn from(value: std::io::Error) -> Self {
        Self::SourceUnavailable(value.to_string())
    }
}

impl From<hound::Error> for BeatSyncError {
    fn from(value: hound::Error) -> Self {
        match value {
            hound::Error::IoError(err) => Self::from(err),
            other => Self::Decode(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for BeatSyncError {
    fn from(value: serde_json::Error) -> Self {
        Self::InvalidConfiguration(value.to_string())
    }
}

impl From<&str> for BeatSyncError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for BeatSyncError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_become_source_unavailable() {
        let err: BeatSyncError =
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing.wav").into();
        assert!(matches!(err, BeatSyncError::SourceUnavailable(_)));
        assert!(err.degrades_to_empty());
    }

    #[test]
    fn configuration_errors_do_not_degrade() {
        let err = BeatSyncError::invalid("sync intensity 140 out of range");
        assert!(!err.degrades_to_empty());
        assert!(format!("{err}").contains("140"));
    }
}
