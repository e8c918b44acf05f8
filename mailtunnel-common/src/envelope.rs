use std::fmt::{self, Display};

use mailparse::{MailAddr, SingleInfo};

use crate::{header::decode_any_header, message::Message};

/// The headers a recipient can be visible in, in order of precedence
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecipientHeader {
    To,
    ResentTo,
    Cc,
    ResentCc,
    Bcc,
    ResentBcc,
}

impl RecipientHeader {
    pub const ALL: [Self; 6] = [
        Self::To,
        Self::ResentTo,
        Self::Cc,
        Self::ResentCc,
        Self::Bcc,
        Self::ResentBcc,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::To => "To",
            Self::ResentTo => "Resent-To",
            Self::Cc => "Cc",
            Self::ResentCc => "Resent-Cc",
            Self::Bcc => "Bcc",
            Self::ResentBcc => "Resent-Bcc",
        }
    }
}

impl Display for RecipientHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One entry of [`Envelope::recipients`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Recipient {
    /// The envelope recipient, `None` for addresses only visible in a header
    pub address: Option<String>,
    /// Display form, e.g. `"Name" <local@domain>`
    pub formatted: String,
    /// Where the address was found, `Bcc` when it was in no header at all
    pub header: RecipientHeader,
}

/// Format an address the way it would appear in a header
pub fn format_address(display_name: &str, address: &str) -> String {
    SingleInfo {
        display_name: (!display_name.is_empty()).then(|| display_name.to_string()),
        addr: address.to_string(),
    }
    .to_string()
}

/// Every mailbox in `raw`, groups flattened
fn addresses_in(name: &str, raw: &[u8]) -> Vec<SingleInfo> {
    let mut line = Vec::with_capacity(name.len() + raw.len() + 2);
    line.extend_from_slice(name.as_bytes());
    line.extend_from_slice(b": ");
    line.extend_from_slice(raw);

    let parsed = mailparse::parse_header(&line)
        .and_then(|(header, _)| mailparse::addrparse_header(&header));

    match parsed {
        Ok(list) => list
            .iter()
            .flat_map(|addr| match addr {
                MailAddr::Single(single) => vec![single.clone()],
                MailAddr::Group(group) => group.addrs.clone(),
            })
            .collect(),
        Err(err) => {
            tracing::debug!(
                "Ignoring unparseable {name} header {:?}: {err}",
                String::from_utf8_lossy(raw)
            );
            Vec::new()
        }
    }
}

/// A message together with the sender and recipients the transport gave us
#[derive(Clone, Debug)]
pub struct Envelope {
    message: Message,
    sender: String,
    rcpt_to: Vec<String>,
}

impl Envelope {
    pub const fn new(message: Message, sender: String, rcpt_to: Vec<String>) -> Self {
        Self {
            message,
            sender,
            rcpt_to,
        }
    }

    #[inline]
    pub const fn message(&self) -> &Message {
        &self.message
    }

    #[inline]
    pub const fn message_mut(&mut self) -> &mut Message {
        &mut self.message
    }

    /// The envelope sender (MAIL FROM)
    #[inline]
    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// The envelope recipients (RCPT TO), as the transport handed them up
    #[inline]
    pub fn rcpt_to(&self) -> &[String] {
        &self.rcpt_to
    }

    ///
    /// Pair every envelope recipient with the header it is visible in.
    ///
    /// Headers are scanned in [`RecipientHeader::ALL`] order and the first
    /// header an address shows up in wins, so `To` beats `Cc`. Envelope
    /// recipients found in no header are reported as `Bcc`. Addresses only
    /// visible in headers are included with no envelope address. The result is
    /// ordered by header precedence.
    ///
    pub fn recipients(&self) -> Vec<Recipient> {
        // Decoding must happen after address parsing: an encoded display name
        // may hide a comma.
        let mut visible: Vec<(String, String, RecipientHeader)> = Vec::new();
        for header in RecipientHeader::ALL {
            for raw in self.message.get_all_headers(header.name()) {
                for single in addresses_in(header.name(), raw) {
                    let address = decode_any_header(single.addr.as_bytes());
                    if !visible.iter().any(|(seen, _, _)| *seen == address) {
                        visible.push((address, single.display_name.unwrap_or_default(), header));
                    }
                }
            }
        }

        let mut result = Vec::with_capacity(self.rcpt_to.len() + visible.len());
        for address in &self.rcpt_to {
            let (display_name, header) = visible
                .iter()
                .position(|(seen, _, _)| seen == address)
                .map_or((String::new(), RecipientHeader::Bcc), |i| {
                    let (_, display_name, header) = visible.remove(i);
                    (display_name, header)
                });

            result.push(Recipient {
                address: Some(address.clone()),
                formatted: format_address(&display_name, address),
                header,
            });
        }

        result.extend(visible.into_iter().map(|(address, display_name, header)| Recipient {
            address: None,
            formatted: format_address(&display_name, &address),
            header,
        }));

        result.sort_by_key(|recipient| recipient.header);
        result
    }
}
