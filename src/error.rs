// MIT License - Copyright (c) 2026 Peter Wright
// Alarm control core

/// All errors that can occur in the alarm control library.
///
/// The state machine itself never fails: unreadable sensors become trouble,
/// bad commands are logged and ignored. These errors surface at the edges
/// (configuration loading, command parsing, the controller channel).
#[derive(Debug, thiserror::Error)]
pub enum AlarmError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Invalid mode: {value}")]
    InvalidMode { value: String },

    #[error("Unknown sensor: {id}")]
    UnknownSensor { id: String },

    #[error("Transition {from} -> {to} rejected")]
    TransitionRejected { from: String, to: String },

    #[error("Controller channel closed")]
    ChannelClosed,
}

impl AlarmError {
    /// Whether the caller can keep going after this error.
    ///
    /// Rejected commands leave the state machine untouched; a closed
    /// channel or unreadable configuration does not.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AlarmError::InvalidMode { .. }
                | AlarmError::UnknownSensor { .. }
                | AlarmError::TransitionRejected { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, AlarmError>;
