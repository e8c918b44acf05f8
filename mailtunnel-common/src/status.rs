use core::fmt::{self, Display, Formatter};

/// The SMTP reply codes the forwarder hands back to the transport.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Debug)]
pub enum Status {
    Ok = 250,
    ActionUnavailable = 451,
    Error = 550,
}

impl Status {
    /// Checks if the status is a permanent rejection
    pub fn is_permanent(self) -> bool {
        u32::from(self) >= 500
    }

    /// Checks if the status is a temporary rejection
    pub fn is_temporary(self) -> bool {
        (400..500).contains(&u32::from(self))
    }
}

impl From<Status> for u32 {
    fn from(value: Status) -> Self {
        match value {
            Status::Ok => 250,
            Status::ActionUnavailable => 451,
            Status::Error => 550,
        }
    }
}

impl Display for Status {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(fmt, "{}", u32::from(*self))
    }
}

/// A status code together with the text sent along with it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    pub status: Status,
    pub text: &'static str,
}

impl Reply {
    pub const ACCEPTED: Self = Self {
        status: Status::Ok,
        text: "OK",
    };

    pub const MAILBOX_UNAVAILABLE: Self = Self {
        status: Status::Error,
        text: "Requested action not taken: mailbox unavailable",
    };

    pub const PROCESSING_ERROR: Self = Self {
        status: Status::ActionUnavailable,
        text: "Requested action aborted: error in processing",
    };

    pub const fn is_accepted(&self) -> bool {
        matches!(self.status, Status::Ok)
    }
}

impl Display for Reply {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        write!(fmt, "{} {}", self.status, self.text)
    }
}

#[cfg(test)]
mod test {
    use super::{Reply, Status};

    #[test]
    fn status() {
        assert!(Status::Error.is_permanent());
        assert!(!Status::Error.is_temporary());

        assert!(Status::ActionUnavailable.is_temporary());
        assert!(!Status::ActionUnavailable.is_permanent());

        assert!(!Status::Ok.is_temporary());
        assert_eq!(u32::from(Status::Error), 550);
    }

    #[test]
    fn reply_text() {
        assert_eq!(Reply::ACCEPTED.to_string(), "250 OK");
        assert_eq!(
            Reply::MAILBOX_UNAVAILABLE.to_string(),
            "550 Requested action not taken: mailbox unavailable"
        );
        assert_eq!(
            Reply::PROCESSING_ERROR.to_string(),
            "451 Requested action aborted: error in processing"
        );
    }
}
