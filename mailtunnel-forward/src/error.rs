//! Typed error handling for forwarding.
//!
//! Failures are split by what the transport should be told:
//! - Invalid recipients are permanent (550), resubmitting cannot fix an alias
//! - Everything else asks the sender to retry later (451)

use mailtunnel_common::{MessageError, Reply};
use thiserror::Error;

/// Top-level forwarding error type.
#[derive(Debug, Error)]
pub enum ForwardError {
    /// One or more recipients resolved to nobody. Carries every failing name.
    #[error("Invalid recipient: {}", .0.join(", "))]
    InvalidRecipient(Vec<String>),

    /// The raw bytes could not be made into an envelope.
    #[error("Could not construct envelope: {0}")]
    EnvelopeConstruction(#[from] MessageError),

    /// The delivery sink failed. Groups delivered before the failure stay
    /// delivered.
    #[error("Delivery failed: {0}")]
    Delivery(#[from] DeliveryError),

    /// Every recipient translated, but nobody is left to deliver to.
    #[error("Nobody to deliver to for {0}")]
    NoRecipients(String),

    /// Any other failure while handling the envelope.
    #[error("Could not handle envelope: {0}")]
    Handling(String),
}

impl ForwardError {
    /// Convenience for a single failing name
    pub fn invalid(name: impl Into<String>) -> Self {
        Self::InvalidRecipient(vec![name.into()])
    }

    /// Returns `true` if resubmitting the same message can never succeed.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::InvalidRecipient(_))
    }

    /// The reply the transport should send for this failure.
    #[must_use]
    pub const fn reply(&self) -> Reply {
        if self.is_permanent() {
            Reply::MAILBOX_UNAVAILABLE
        } else {
            Reply::PROCESSING_ERROR
        }
    }
}

/// A failed hand-off to a [`DeliverySink`](crate::DeliverySink).
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The next hop refused the message outright.
    #[error("Permanent failure: {0}")]
    Permanent(#[from] PermanentError),

    /// The next hop could not take the message right now.
    #[error("Temporary failure: {0}")]
    Temporary(#[from] TemporaryError),

    /// The sink itself failed.
    #[error("System error: {0}")]
    System(#[from] SystemError),
}

#[derive(Debug, Error)]
pub enum PermanentError {
    #[error("No recipients given for a message from {0:?}")]
    RecipientsRefused(String),
}

#[derive(Debug, Error)]
pub enum TemporaryError {
    #[error("Relay unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum SystemError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<std::io::Error> for DeliveryError {
    fn from(error: std::io::Error) -> Self {
        Self::System(SystemError::Io(error))
    }
}
