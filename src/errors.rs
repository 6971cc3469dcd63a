//! Unified error type for the swipe gate.
//!
//! Variants fall into three groups. Rejections carry the human-readable
//! reason that is shown (and spoken) on the serving-window terminal. Internal
//! failures (database, cache, timeout) are logged in full but surface to the
//! terminal as a generic retry message. The license failure is fatal and
//! stops the process.

use thiserror::Error;

/// All errors produced by the gate.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be read or is malformed
    #[error("Configuration error: {message}")]
    Config {
        /// What went wrong
        message: String,
    },

    /// No card-holder is registered for this card number
    #[error("card {card_no} is not registered")]
    CardNotFound {
        /// The card number that was swiped
        card_no: String,
    },

    /// The card-holder's department has no dining policy
    #[error("department has no dining policy configured")]
    NoDiningPolicy {
        /// Department of the card-holder
        dept_id: i64,
    },

    /// The swipe happened outside the permitted dinner window
    #[error("not within dining hours")]
    OutsideDiningHours,

    /// The card already collected this period's meal today
    #[error("this card already collected {period} today")]
    DuplicateSwipe {
        /// Name of the period
        period: String,
    },

    /// The reserved meal is served at another window
    #[error("go to the correct window")]
    WrongWindow {
        /// Meal id on the reservation
        reserved: i64,
        /// Meal id the swiping window serves
        served: i64,
    },

    /// The swiping device is not bound to any window
    #[error("unknown device, cannot collect meal")]
    UnknownDevice {
        /// Device identifier from the request header
        device_id: String,
    },

    /// The window assignment could not be read from the cache
    #[error("window configuration read failed")]
    WindowConfigUnavailable,

    /// Reference configuration needed for a decision is missing or unparsable
    #[error("system configuration error")]
    SystemConfig {
        /// Detail for the log
        detail: String,
    },

    /// A closed label set received a value outside the set
    #[error("unrecognized {kind} label: {value:?}")]
    UnknownLabel {
        /// Which label set
        kind: &'static str,
        /// The offending value
        value: String,
    },

    /// The swipe did not finish within the request deadline
    #[error("request timed out")]
    Timeout,

    /// The operating license is missing, forged or expired
    #[error("License check failed: {message}")]
    License {
        /// What went wrong
        message: String,
    },

    /// Database error from `SeaORM`
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Cache error from Redis
    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns true for rejections whose message is meant for the card-holder.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::CardNotFound { .. }
                | Self::NoDiningPolicy { .. }
                | Self::OutsideDiningHours
                | Self::DuplicateSwipe { .. }
                | Self::WrongWindow { .. }
                | Self::UnknownDevice { .. }
                | Self::WindowConfigUnavailable
                | Self::SystemConfig { .. }
        )
    }

    /// Returns true if the process must stop.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::License { .. })
    }

    /// Message shown on the terminal for this error.
    #[must_use]
    pub fn terminal_message(&self) -> String {
        if self.is_rejection() {
            self.to_string()
        } else {
            "swipe failed, please swipe again".to_string()
        }
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
