//! Shared fixtures for alias resolution tests
//!
//! The organisation in [`FIXTURE`] has the 2013 board (people 10 to 17), two
//! FU and an EFU in 2013, a FORM in 2014 (person 18) and a handful of groups.
//! Everyone has the address `p<id>@example.org`, but person 6 does not accept
//! direct mail.

#![allow(dead_code)]

use std::sync::Arc;

use mailtunnel_alias::{Resolver, StaticFacts};

pub const FIXTURE: &str = r#"(
    current_period: Some(2013),
    groups: [
        (id: 7, name: "JUNTA", pattern: "(?:FORM)?JUNTA(?:EN)?", members: [1, 2, 3]),
        (id: 10, name: "REVY", pattern: "REVY(?:EN)?", members: [3, 4, 5]),
        (id: 13, name: "ADMIN", pattern: "ADMIN(?:ISTRATOR(?:ERNE|EN)?)?", members: [9]),
        (id: 4, name: "HEST", pattern: "HEST", members: [2, 8]),
        (id: 5, name: "KET", pattern: "KET", members: [5, 7, 8]),
        (id: 30, name: "FILF", pattern: "FILF", members: []),
    ],
    titles: [
        (person: 10, kind: "BEST", root: "FORM", period: 2013),
        (person: 11, kind: "BEST", root: "CERM", period: 2013),
        (person: 12, kind: "BEST", root: "INKA", period: 2013),
        (person: 13, kind: "BEST", root: "KASS", period: 2013),
        (person: 14, kind: "BEST", root: "NF", period: 2013),
        (person: 15, kind: "BEST", root: "PR", period: 2013),
        (person: 16, kind: "BEST", root: "SEKR", period: 2013),
        (person: 17, kind: "BEST", root: "VC", period: 2013),
        (person: 18, kind: "BEST", root: "FORM", period: 2014),
        (person: 20, kind: "FU", root: "FUAA", period: 2013),
        (person: 21, kind: "FU", root: "FUIOE", period: 2013),
        (person: 22, kind: "EFU", root: "EFUIT", period: 2013),
    ],
    people: [
        (id: 1, email: Some("p1@example.org")),
        (id: 2, email: Some("p2@example.org")),
        (id: 3, email: Some("p3@example.org")),
        (id: 4, email: Some("p4@example.org")),
        (id: 5, email: Some("p5@example.org")),
        (id: 6, email: Some("p6@example.org"), allow_direct_email: false),
        (id: 7, email: Some("p7@example.org")),
        (id: 8, email: Some("p8@example.org")),
        (id: 9, email: Some("p9@example.org")),
        (id: 10, email: Some("p10@example.org")),
        (id: 11, email: Some("p11@example.org")),
        (id: 12, email: Some("p12@example.org")),
        (id: 13, email: Some("p13@example.org")),
        (id: 14, email: Some("p14@example.org")),
        (id: 15, email: Some("p15@example.org")),
        (id: 16, email: Some("p16@example.org")),
        (id: 17, email: Some("p17@example.org")),
        (id: 18, email: Some("p18@example.org")),
        (id: 20, email: Some("p20@example.org")),
        (id: 21, email: Some("p21@example.org")),
        (id: 22, email: Some("p22@example.org")),
    ],
)"#;

/// Groups that resolve to somebody
pub const GROUPS: [&str; 5] = ["JUNTA", "REVY", "ADMIN", "HEST", "KET"];

pub fn facts() -> StaticFacts {
    ron::from_str(FIXTURE).unwrap()
}

pub fn resolver() -> Resolver {
    resolver_with(facts())
}

pub fn resolver_with(facts: StaticFacts) -> Resolver {
    Resolver::new(Arc::new(facts)).unwrap()
}
