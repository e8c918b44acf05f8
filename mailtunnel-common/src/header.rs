//! Header value codec.
//!
//! Decoding never fails: malformed encoded words are kept as written, unknown or
//! broken charsets decode with replacement characters, and a header that cannot
//! be tokenised at all falls back to a lossy UTF-8 view of its raw bytes.

use base64::{Engine, engine::general_purpose::STANDARD};

/// Longest raw chunk that fits a 75 octet `=?utf-8?b?...?=` encoded word.
const ENCODED_WORD_CHUNK: usize = 45;

/// Decode an RFC 2047 header value, absorbing every error on the way.
///
/// # Examples
///
/// ```
/// use mailtunnel_common::header::decode_any_header;
///
/// assert_eq!(decode_any_header(b"=?UTF-8?Q?Gl=C3=A6delig_jul?="), "Glædelig jul");
/// assert_eq!(decode_any_header(b"plain words"), "plain words");
/// ```
pub fn decode_any_header(raw: &[u8]) -> String {
    let mut line = Vec::with_capacity(raw.len() + 4);
    line.extend_from_slice(b"X: ");
    line.extend_from_slice(raw);

    match mailparse::parse_header(&line) {
        Ok((header, _)) => header.get_value(),
        Err(err) => {
            tracing::debug!("Header value could not be tokenised ({err}), decoding lossily");
            String::from_utf8_lossy(raw).into_owned()
        }
    }
}

/// Whether a value can be written into a header without encoding it.
fn is_plain(value: &str) -> bool {
    value.is_ascii()
        && !value.contains("=?")
        && !value.chars().any(|c| c.is_ascii_control() && c != '\t')
}

/// Encode `value` for use as a header value.
///
/// Plain ASCII is written as-is. Anything else becomes a run of base64
/// encoded words, separated by single spaces and never folded.
///
/// # Examples
///
/// ```
/// use mailtunnel_common::header::{decode_any_header, encode_header_value};
///
/// assert_eq!(encode_header_value("Hello"), "Hello");
///
/// let encoded = encode_header_value("[TK] Glædelig jul");
/// assert!(encoded.starts_with("=?utf-8?b?"));
/// assert_eq!(decode_any_header(encoded.as_bytes()), "[TK] Glædelig jul");
/// ```
pub fn encode_header_value(value: &str) -> String {
    if is_plain(value) {
        return value.to_string();
    }

    let mut words = Vec::new();
    let mut chunk = String::new();

    for c in value.chars() {
        if chunk.len() + c.len_utf8() > ENCODED_WORD_CHUNK {
            words.push(encoded_word(&chunk));
            chunk.clear();
        }
        chunk.push(c);
    }

    if !chunk.is_empty() {
        words.push(encoded_word(&chunk));
    }

    words.join(" ")
}

fn encoded_word(chunk: &str) -> String {
    format!("=?utf-8?b?{}?=", STANDARD.encode(chunk.as_bytes()))
}
