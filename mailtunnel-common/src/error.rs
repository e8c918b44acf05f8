//! Error types for the mailtunnel-common crate.

use thiserror::Error;

/// Errors that can occur while building a [`Message`](crate::Message) from raw bytes.
#[derive(Debug, Error)]
pub enum MessageError {
    /// The header block could not be split into fields.
    #[error("Unable to parse header block: {0}")]
    Headers(#[from] mailparse::MailParseError),

    /// The message carried no bytes at all.
    #[error("Empty message")]
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_error_display() {
        assert_eq!(MessageError::Empty.to_string(), "Empty message");
    }
}
