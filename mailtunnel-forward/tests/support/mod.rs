//! Shared fixtures for pipeline tests

#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc};

use mailtunnel_forward::{Forwarder, Hooks, MemorySink};

pub const REMOTE_PEER: &str = "192.0.2.7:40000";

pub fn peer() -> SocketAddr {
    REMOTE_PEER.parse().unwrap()
}

/// A message with the given header lines and a short body, CRLF terminated
pub fn raw_message(headers: &[&str]) -> Vec<u8> {
    let mut raw = String::new();
    for header in headers {
        raw.push_str(header);
        raw.push_str("\r\n");
    }
    raw.push_str("\r\nHello there\r\n");
    raw.into_bytes()
}

pub fn rcpt(addresses: &[&str]) -> Vec<String> {
    addresses.iter().map(ToString::to_string).collect()
}

pub fn forwarder(hooks: Hooks) -> (Forwarder, MemorySink) {
    let sink = MemorySink::new();
    let forwarder = Forwarder::new("mx.example.org", Arc::new(sink.clone())).with_hooks(hooks);
    (forwarder, sink)
}
