//! The forwarding pipeline
//!
//! An envelope handed up by the transport is translated recipient by
//! recipient, then either delivered once to every resulting address or, when
//! the translation produced groups, once per group with per-group sender and
//! list headers. No address receives the same message twice.

mod error;
mod forwarder;
mod hooks;
mod sink;
mod target;

pub use error::{DeliveryError, ForwardError, PermanentError, SystemError, TemporaryError};
pub use forwarder::Forwarder;
pub use hooks::{ExtraHeader, Hooks};
pub use sink::{Delivery, DeliverySink, DirectorySink, LogSink, MemorySink};
pub use target::{RecipientGroup, TargetRecipient};
