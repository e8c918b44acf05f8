use std::fmt::{self, Debug};

use base64::{Engine, engine::general_purpose::STANDARD};

use crate::{
    error::MessageError,
    header::{decode_any_header, encode_header_value},
    sanity,
};

/// The line terminator a message was written with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LineEnding {
    #[default]
    Crlf,
    Lf,
}

impl LineEnding {
    /// Detect the terminator from the first line of `raw`
    fn detect(raw: &[u8]) -> Self {
        match raw.iter().position(|&b| b == b'\n') {
            Some(i) if i > 0 && raw[i - 1] == b'\r' => Self::Crlf,
            Some(_) => Self::Lf,
            None => Self::default(),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Crlf => "\r\n",
            Self::Lf => "\n",
        }
    }
}

#[derive(Clone, Eq)]
pub struct Header {
    name: String,
    value: Vec<u8>,
}

impl PartialEq for Header {
    fn eq(&self, other: &Self) -> bool {
        self.named(&other.name) && self.value == other.value
    }
}

impl Debug for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Header")
            .field("name", &self.name)
            .field("value", &String::from_utf8_lossy(&self.value))
            .finish()
    }
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Header names compare case-insensitively
    pub fn named(&self, v: &str) -> bool {
        self.name.eq_ignore_ascii_case(v)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The value exactly as it will be written, folding included
    pub fn raw_value(&self) -> &[u8] {
        &self.value
    }

    /// The value with encoded words decoded
    pub fn decoded_value(&self) -> String {
        decode_any_header(&self.value)
    }
}

/// A parsed message: an ordered list of header fields, duplicates allowed,
/// followed by an opaque body.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Message {
    headers: Vec<Header>,
    body: Vec<u8>,
    line_ending: LineEnding,
}

impl Message {
    ///
    /// Parse a message into its headers and body.
    ///
    /// The result is written back out and compared with `raw`; a mismatch is
    /// recorded through [`sanity::record_mismatch`] but the parsed message is
    /// returned all the same.
    ///
    /// # Errors
    ///
    /// If `raw` is empty, or the header block cannot be split into fields.
    ///
    pub fn parse(raw: &[u8]) -> Result<Self, MessageError> {
        if raw.is_empty() {
            return Err(MessageError::Empty);
        }

        let (fields, body_offset) = mailparse::parse_headers(raw)?;
        let headers = fields
            .iter()
            .map(|field| Header::new(field.get_key(), field.get_value_raw()))
            .collect();

        let message = Self {
            headers,
            body: raw[body_offset.min(raw.len())..].to_vec(),
            line_ending: LineEnding::detect(raw),
        };

        let serialized = message.as_bytes();
        if !sanity::is_sane(raw, &serialized) {
            sanity::record_mismatch(raw, &serialized);
        }

        Ok(message)
    }

    ///
    /// Build a fresh plain-text message.
    ///
    /// When `message_id` is not given, one is generated from the current time
    /// and the domain of `from`.
    ///
    /// # Examples
    ///
    /// ```
    /// use mailtunnel_common::Message;
    ///
    /// let message = Message::compose("a@example.org", "b@example.org", "Hej", "Body", None);
    /// assert_eq!(message.subject(), "Hej");
    /// assert!(message.get_header("Message-ID").unwrap().ends_with("@example.org"));
    /// ```
    ///
    pub fn compose(
        from: &str,
        to: &str,
        subject: &str,
        body: &str,
        message_id: Option<&str>,
    ) -> Self {
        let mut message = Self::default();
        message.add_header("From", from);
        message.add_header("To", to);
        message.set_subject(subject);
        message.add_header(
            "Date",
            chrono::Utc::now()
                .format("%a, %d %b %Y %T +0000")
                .to_string(),
        );

        let message_id = message_id.map_or_else(
            || {
                let domain = from
                    .rsplit_once('@')
                    .map_or("localhost", |(_, domain)| domain.trim_end_matches('>'));
                make_message_id(domain)
            },
            str::to_string,
        );
        message.add_header("Message-ID", message_id);
        message.set_body_text(body);

        message
    }

    /// Replace the body with `body` as base64 encoded UTF-8 text
    pub fn set_body_text(&mut self, body: &str) {
        self.set_unique_header("MIME-Version", "1.0");
        self.set_unique_header("Content-Type", "text/plain; charset=\"utf-8\"");
        self.set_unique_header("Content-Transfer-Encoding", "base64");

        let encoded = STANDARD.encode(body.as_bytes());
        let mut wrapped = String::with_capacity(encoded.len() + encoded.len() / 38 + 2);
        for line in encoded.as_bytes().chunks(76) {
            wrapped.push_str(&String::from_utf8_lossy(line));
            wrapped.push_str(self.line_ending.as_str());
        }

        self.body = wrapped.into_bytes();
    }

    /// The decoded text of the message, or of its first text part.
    ///
    /// # Errors
    ///
    /// If the serialised message cannot be parsed as MIME.
    pub fn body_text(&self) -> Result<String, MessageError> {
        let bytes = self.as_bytes();
        let parsed = mailparse::parse_mail(&bytes)?;

        let part = if parsed.subparts.is_empty() {
            &parsed
        } else {
            parsed
                .subparts
                .iter()
                .find(|part| part.ctype.mimetype.starts_with("text/"))
                .unwrap_or(&parsed)
        };

        Ok(part.get_body()?)
    }

    pub const fn line_ending(&self) -> LineEnding {
        self.line_ending
    }

    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Append a header after every existing one
    pub fn add_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.push(Header::new(name, value.into()));
    }

    /// Insert a header in front of every existing one, as trace fields must be
    pub fn add_header_before(&mut self, name: &str, value: impl Into<String>) {
        self.headers.insert(0, Header::new(name, value.into()));
    }

    /// Replace the first `name` header, or append one if there is none
    pub fn set_unique_header(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.headers.iter_mut().find(|header| header.named(name)) {
            Some(header) => header.value = value.into_bytes(),
            None => self.add_header(name, value),
        }
    }

    /// The raw value of the first `name` header
    pub fn get_header(&self, name: &str) -> Option<String> {
        self.get_unique_header(name)
    }

    /// The raw value of the first `name` header, `None` if absent
    pub fn get_unique_header(&self, name: &str) -> Option<String> {
        self.headers
            .iter()
            .find(|header| header.named(name))
            .map(|header| String::from_utf8_lossy(&header.value).into_owned())
    }

    /// Raw values of every `name` header, in order
    pub fn get_all_headers(&self, name: &str) -> Vec<&[u8]> {
        self.headers
            .iter()
            .filter(|header| header.named(name))
            .map(Header::raw_value)
            .collect()
    }

    /// The decoded subject, empty when there is none
    pub fn subject(&self) -> String {
        self.headers
            .iter()
            .find(|header| header.named("Subject"))
            .map(Header::decoded_value)
            .unwrap_or_default()
    }

    /// Set the subject, encoding it if it isn't plain ASCII
    pub fn set_subject(&mut self, subject: &str) {
        self.set_unique_header("Subject", encode_header_value(subject));
    }

    /// Serialise the message. Header lines are never wrapped, so what we
    /// parsed is what gets written.
    pub fn as_bytes(&self) -> Vec<u8> {
        let newline = self.line_ending.as_str().as_bytes();
        let mut out = Vec::with_capacity(
            self.body.len()
                + self
                    .headers
                    .iter()
                    .map(|h| h.name.len() + h.value.len() + 4)
                    .sum::<usize>()
                + 2,
        );

        for header in &self.headers {
            out.extend_from_slice(header.name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(&header.value);
            out.extend_from_slice(newline);
        }
        out.extend_from_slice(newline);
        out.extend_from_slice(&self.body);

        out
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.as_bytes()))
    }
}

/// A message id unique to this moment, at `domain`
pub fn make_message_id(domain: &str) -> String {
    format!(
        "{}@{domain}",
        chrono::Utc::now().format("%Y%m%d%H%M%S%.6f")
    )
}

/// Normalise every line ending in `data` to CRLF, as the wire wants it
pub fn fix_eols(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 32);
    let mut bytes = data.iter().copied().peekable();

    while let Some(b) = bytes.next() {
        match b {
            b'\r' => {
                if bytes.peek() == Some(&b'\n') {
                    bytes.next();
                }
                out.extend_from_slice(b"\r\n");
            }
            b'\n' => out.extend_from_slice(b"\r\n"),
            _ => out.push(b),
        }
    }

    out
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::{Header, LineEnding, Message, fix_eols};

    const SIMPLE: &[u8] = include_bytes!("../test/simple.eml");

    #[test]
    fn headers_compare_case_insensitively() {
        assert_eq!(Header::new("From", "a@b"), Header::new("FROM", "a@b"));
        assert_ne!(Header::new("From", "a@b"), Header::new("From", "b@a"));
    }

    #[test]
    fn parse_message() {
        let message = Message::parse(SIMPLE).unwrap();

        assert_eq!(message.line_ending(), LineEnding::Crlf);
        assert_eq!(
            message.get_all_headers("Received"),
            vec![&b"from a by b"[..], &b"from c by d"[..]]
        );
        assert_eq!(message.get_header("from").as_deref(), Some("Test@test.com"));
        assert_eq!(message.body(), b"Body Here\r\n");
        assert_eq!(message.as_bytes(), SIMPLE);
    }

    #[test]
    fn parse_empty_message() {
        assert!(Message::parse(b"").is_err());
    }

    #[test]
    fn folded_headers_survive() {
        let raw = b"Subject: a long\r\n\tsubject\r\nTo: x@y\r\n\r\nbody\r\n";
        let message = Message::parse(raw).unwrap();

        assert_eq!(message.as_bytes(), raw);
        assert!(message.subject().starts_with("a long"));
        assert!(message.subject().ends_with("subject"));
    }

    #[test]
    fn add_header_before_goes_first() {
        let mut message = Message::parse(SIMPLE).unwrap();
        message.add_header_before("Received", "from us");

        assert_eq!(message.headers()[0], Header::new("Received", "from us"));
        assert_eq!(message.get_all_headers("Received").len(), 3);
    }

    #[test]
    fn set_unique_header_replaces_first() {
        let mut message = Message::parse(SIMPLE).unwrap();
        message.set_unique_header("received", "replaced");
        message.set_unique_header("List-Id", "<list.example.org>");

        assert_eq!(
            message.get_all_headers("Received"),
            vec![&b"replaced"[..], &b"from c by d"[..]]
        );
        assert_eq!(
            message.headers().last(),
            Some(&Header::new("List-Id", "<list.example.org>"))
        );
    }

    #[test]
    fn subject_round_trips_through_encoding() {
        let mut message = Message::parse(SIMPLE).unwrap();
        assert_eq!(message.subject(), "");

        message.set_subject("[TK] Glædelig jul");
        assert_eq!(message.subject(), "[TK] Glædelig jul");
        assert_eq!(message.get_all_headers("Subject").len(), 1);
    }

    #[test]
    fn compose_round_trips() {
        let composed = Message::compose(
            "sender@example.org",
            "FORM@example.org",
            "Glædelig jul",
            "Hej\nmed dig",
            Some("<fixed@example.org>"),
        );

        let reparsed = Message::parse(&composed.as_bytes()).unwrap();
        assert_eq!(reparsed, composed);
        assert_eq!(reparsed.subject(), "Glædelig jul");
        assert_eq!(reparsed.body_text().unwrap().trim_end(), "Hej\nmed dig");
    }

    #[test]
    fn clones_are_deep() {
        let original = Message::parse(SIMPLE).unwrap();
        let mut copy = original.clone();
        copy.set_subject("changed");

        assert_eq!(original.subject(), "");
        assert_eq!(copy.subject(), "changed");
    }

    #[test]
    fn eols_are_fixed() {
        assert_eq!(fix_eols(b"a\nb\rc\r\nd"), b"a\r\nb\r\nc\r\nd");
    }
}
