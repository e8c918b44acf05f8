pub mod envelope;
pub mod error;
pub mod header;
pub mod logging;
pub mod message;
pub mod sanity;
pub mod status;

pub use envelope::{Envelope, Recipient, RecipientHeader};
pub use error::MessageError;
pub use message::Message;
pub use status::{Reply, Status};
pub use tracing;
