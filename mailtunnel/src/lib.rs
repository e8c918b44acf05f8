//! An alias-resolving mail forwarder for one organisation
//!
//! Configuration is a single RON document naming the organisation, its facts
//! and where forwarded mail goes. [`Mailtunnel::service`] turns it into a
//! [`Service`] that takes one received message at a time.

pub mod config;
pub mod organisation;
mod service;

pub use config::{Mailtunnel, OrganisationConfig, SinkConfig};
pub use organisation::Organisation;
pub use service::Service;
