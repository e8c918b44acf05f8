//! Shared fixtures for end-to-end forwarding tests
//!
//! The organisation forwards for `taagekammeret.dk`. Its 2013 board is people
//! 10 to 12, JUNTA is people 1 to 3, REVY is 3 to 5 and ADMIN is person 9.
//! Everyone is reachable at `p<id>@example.net`.

#![allow(dead_code)]

use std::{net::SocketAddr, path::Path, sync::Arc};

use mailtunnel::{Mailtunnel, Service};
use mailtunnel_forward::MemorySink;

pub const DOMAIN: &str = "taagekammeret.dk";

pub const CONFIG: &str = r#"(
    hostname: "mx.taagekammeret.dk",
    diagnostics: (enabled: false),
    organisation: (
        domain: "taagekammeret.dk",
        subject_tag: "TK",
        admins: ["fallback@example.net"],
    ),
    facts: (
        current_period: Some(2013),
        groups: [
            (id: 1, name: "JUNTA", pattern: "JUNTA", members: [1, 2, 3]),
            (id: 2, name: "REVY", pattern: "REVY(?:EN)?", members: [3, 4, 5]),
            (id: 3, name: "ADMIN", pattern: "ADMIN", members: [9]),
        ],
        titles: [
            (person: 10, kind: "BEST", root: "FORM", period: 2013),
            (person: 11, kind: "BEST", root: "KASS", period: 2013),
            (person: 12, kind: "BEST", root: "CERM", period: 2013),
        ],
        people: [
            (id: 1, email: Some("p1@example.net")),
            (id: 2, email: Some("p2@example.net")),
            (id: 3, email: Some("p3@example.net")),
            (id: 4, email: Some("p4@example.net")),
            (id: 5, email: Some("p5@example.net")),
            (id: 9, email: Some("p9@example.net")),
            (id: 10, email: Some("p10@example.net")),
            (id: 11, email: Some("p11@example.net")),
            (id: 12, email: Some("p12@example.net")),
        ],
    ),
)"#;

pub fn peer() -> SocketAddr {
    "198.51.100.20:51000".parse().unwrap()
}

pub fn config(error_directory: &Path) -> Mailtunnel {
    let mut config = Mailtunnel::from_ron(CONFIG).unwrap();
    config.organisation.error_directory = error_directory.to_path_buf();
    config
}

pub fn service(config: Mailtunnel) -> (Service, MemorySink) {
    let sink = MemorySink::new();
    let service = config.service_with_sink(Arc::new(sink.clone())).unwrap();
    (service, sink)
}

pub fn rcpt(local_parts: &[&str]) -> Vec<String> {
    local_parts
        .iter()
        .map(|local| format!("{local}@{DOMAIN}"))
        .collect()
}

pub fn addresses(ids: &[u32]) -> Vec<String> {
    ids.iter().map(|id| format!("p{id}@example.net")).collect()
}

pub fn raw_message(to: &str, subject: &str) -> Vec<u8> {
    format!(
        "From: Sender <sender@example.org>\r\nTo: {to}\r\nSubject: {subject}\r\n\r\nHej med jer\r\n"
    )
    .into_bytes()
}
