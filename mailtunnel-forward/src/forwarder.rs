use std::{collections::BTreeSet, fmt, net::SocketAddr, sync::Arc};

use mailtunnel_common::{Envelope, Message, Reply, incoming, internal};

use crate::{
    error::ForwardError,
    hooks::Hooks,
    sink::DeliverySink,
    target::TargetRecipient,
};

/// Takes envelopes from the transport, works out who they are for and hands
/// one message per delivery unit to the sink.
pub struct Forwarder {
    hostname: String,
    hooks: Hooks,
    sink: Arc<dyn DeliverySink>,
}

impl fmt::Debug for Forwarder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Forwarder")
            .field("hostname", &self.hostname)
            .field("hooks", &self.hooks)
            .field("sink", &self.sink)
            .finish()
    }
}

impl Forwarder {
    /// A forwarder calling itself `hostname` in trace headers
    pub fn new(hostname: impl Into<String>, sink: Arc<dyn DeliverySink>) -> Self {
        Self {
            hostname: hostname.into(),
            hooks: Hooks::default(),
            sink,
        }
    }

    #[must_use]
    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    ///
    /// Entry point for the transport: build an envelope from what it received,
    /// forward it, and answer with the reply to send back.
    ///
    /// Never fails. Unknown recipients are refused permanently, anything else
    /// that goes wrong asks the sender to try again later.
    ///
    #[tracing::instrument(skip(self, data), fields(size = data.len()))]
    pub async fn process_message(
        &self,
        peer: SocketAddr,
        mail_from: &str,
        rcpt_to: &[String],
        data: &[u8],
    ) -> Reply {
        let envelope = match Message::parse(data) {
            Ok(message) => Envelope::new(message, mail_from.to_string(), rcpt_to.to_vec()),
            Err(err) => {
                let err = ForwardError::from(err);
                internal!(level = ERROR, "{err}");
                self.report_error(None, data);
                return err.reply();
            }
        };

        self.log_receipt(peer, &envelope);

        match self.handle_envelope(&envelope, peer).await {
            Ok(reply) => reply,
            Err(err) => {
                internal!(level = ERROR, "{err}");
                self.report_error(Some(&envelope), data);
                err.reply()
            }
        }
    }

    fn report_error(&self, envelope: Option<&Envelope>, data: &[u8]) {
        if let Err(err) = self.hooks.error(envelope, data) {
            internal!(level = ERROR, "Error hook failed: {err}");
        }
    }

    fn log_receipt(&self, peer: SocketAddr, envelope: &Envelope) {
        let recipients = envelope
            .rcpt_to()
            .iter()
            .map(|rcpt| format!("<{rcpt}>"))
            .collect::<Vec<_>>()
            .join(", ");

        let source = if peer.ip().is_loopback() {
            String::new()
        } else {
            format!(" Peer: {peer}")
        };

        incoming!(
            level = INFO,
            "Subject: {:?} From: <{}> To: {recipients}{source}",
            envelope.message().subject(),
            envelope.sender()
        );
    }

    ///
    /// Translate every envelope recipient that is visible in (or hidden from)
    /// the headers, in header precedence order.
    ///
    /// # Errors
    /// [`ForwardError::InvalidRecipient`] naming every recipient that failed
    /// to translate, or the first other failure.
    ///
    pub fn get_envelope_recipients(
        &self,
        envelope: &Envelope,
    ) -> Result<Vec<TargetRecipient>, ForwardError> {
        let mut targets = Vec::new();
        let mut invalid = Vec::new();

        for recipient in envelope.recipients() {
            let Some(address) = recipient.address else {
                continue;
            };

            match self.hooks.translate_recipient(&address) {
                Ok(translated) => targets.extend(translated),
                Err(ForwardError::InvalidRecipient(names)) => invalid.extend(names),
                Err(err) => return Err(err),
            }
        }

        if invalid.is_empty() {
            Ok(targets)
        } else {
            Err(ForwardError::InvalidRecipient(invalid))
        }
    }

    /// The standard trace text: where the message came from, who we are and
    /// who it was for.
    pub fn default_received(&self, envelope: &Envelope, peer: SocketAddr) -> String {
        let recipients = envelope
            .rcpt_to()
            .iter()
            .map(|rcpt| format!("<{rcpt}>"))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "from {}\nby {}\nfor {recipients};\n{}",
            peer.ip(),
            self.hostname,
            chrono::Utc::now().format("%a, %e %b %Y %T +0000 (UTC)")
        )
    }

    /// The folded `Received` value for a delivery, if one should be added
    fn received_header(
        &self,
        envelope: &Envelope,
        peer: SocketAddr,
        target: Option<&TargetRecipient>,
    ) -> Option<String> {
        let text = match self.hooks.received(envelope, peer, target) {
            Some(text) => text?,
            None => self.default_received(envelope, peer),
        };

        let fold = format!("{}\t", envelope.message().line_ending().as_str());
        Some(text.lines().map(str::trim).collect::<Vec<_>>().join(&fold))
    }

    ///
    /// Forward one envelope.
    ///
    /// A message the reject hook refuses is dropped before any recipient is
    /// translated, and still answered as accepted.
    ///
    /// When every target is a plain address the message is delivered once.
    /// Otherwise each target is delivered on its own, in order, and nobody
    /// gets the message twice.
    ///
    /// # Errors
    /// If a hook or the sink fails, or nobody is left to deliver to. Groups
    /// delivered before a sink failure stay delivered, the rest are abandoned.
    ///
    #[tracing::instrument(skip_all, fields(sender = envelope.sender()))]
    pub async fn handle_envelope(
        &self,
        envelope: &Envelope,
        peer: SocketAddr,
    ) -> Result<Reply, ForwardError> {
        if let Some(reason) = self.hooks.reject(envelope) {
            internal!(
                level = WARN,
                "Dropping message from {} to {}: {reason}",
                envelope.sender(),
                envelope.rcpt_to().join(", ")
            );
            return Ok(Reply::ACCEPTED);
        }

        let targets = match self.get_envelope_recipients(envelope) {
            Ok(targets) => targets,
            Err(err) if err.is_permanent() => {
                internal!(level = ERROR, "{err}");
                self.hooks.invalid_recipient(envelope, &err);
                return Ok(err.reply());
            }
            Err(err) => return Err(err),
        };

        let mut envelope = envelope.clone();
        if let Some(subject) = self.hooks.translate_subject(&envelope) {
            envelope.message_mut().set_subject(&subject);
        }

        let targets: Vec<TargetRecipient> = targets
            .into_iter()
            .filter(|target| !target.is_empty())
            .collect();

        if targets.iter().all(TargetRecipient::is_address) {
            self.deliver_flat(envelope, peer, &targets).await?;
        } else {
            self.deliver_grouped(&envelope, peer, &targets).await?;
        }

        Ok(Reply::ACCEPTED)
    }

    async fn deliver_flat(
        &self,
        mut envelope: Envelope,
        peer: SocketAddr,
        targets: &[TargetRecipient],
    ) -> Result<(), ForwardError> {
        let recipients: Vec<String> = targets
            .iter()
            .flat_map(TargetRecipient::addresses)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        if recipients.is_empty() {
            return Err(ForwardError::NoRecipients(envelope.rcpt_to().join(", ")));
        }

        let mail_from = self.hooks.mail_from(&envelope, None);
        if let Some(received) = self.received_header(&envelope, peer, None) {
            envelope.message_mut().add_header_before("Received", received);
        }

        self.sink
            .deliver(envelope.message(), &recipients, &mail_from)
            .await?;
        Ok(())
    }

    async fn deliver_grouped(
        &self,
        envelope: &Envelope,
        peer: SocketAddr,
        targets: &[TargetRecipient],
    ) -> Result<(), ForwardError> {
        let mut already_sent: BTreeSet<String> = BTreeSet::new();

        for target in targets {
            let mut copy = envelope.clone();
            let mail_from = self.hooks.mail_from(&copy, Some(target));
            if let Some(received) = self.received_header(&copy, peer, Some(target)) {
                copy.message_mut().add_header_before("Received", received);
            }

            let recipients: BTreeSet<String> = self
                .hooks
                .group_recipients(target)
                .into_iter()
                .filter(|address| !address.is_empty() && !already_sent.contains(address))
                .collect();

            if recipients.is_empty() {
                internal!(level = DEBUG, "Everyone in {target} has already been sent to");
                continue;
            }
            already_sent.extend(recipients.iter().cloned());

            for (header, value) in self.hooks.extra_headers(&copy, target) {
                copy.message_mut().set_unique_header(header.name(), value);
            }

            let recipients: Vec<String> = recipients.into_iter().collect();
            self.sink
                .deliver(copy.message(), &recipients, &mail_from)
                .await?;
        }

        if already_sent.is_empty() {
            return Err(ForwardError::NoRecipients(envelope.rcpt_to().join(", ")));
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::{net::SocketAddr, sync::Arc};

    use mailtunnel_common::{Envelope, Message};
    use pretty_assertions::assert_eq;

    use super::Forwarder;
    use crate::{Hooks, MemorySink};

    fn peer() -> SocketAddr {
        "192.0.2.1:2525".parse().unwrap()
    }

    fn envelope(raw: &[u8]) -> Envelope {
        Envelope::new(
            Message::parse(raw).unwrap(),
            "sender@example.org".to_string(),
            vec!["a@example.org".to_string(), "b@example.org".to_string()],
        )
    }

    #[test]
    fn default_received_names_everyone() {
        let forwarder = Forwarder::new("mail.example.org", Arc::new(MemorySink::new()));
        let received = forwarder.default_received(&envelope(b"Subject: x\r\n\r\n"), peer());

        let lines: Vec<_> = received.lines().collect();
        assert_eq!(lines[0], "from 192.0.2.1");
        assert_eq!(lines[1], "by mail.example.org");
        assert_eq!(lines[2], "for <a@example.org>, <b@example.org>;");
        assert!(lines[3].ends_with("+0000 (UTC)"));
    }

    #[test]
    fn received_is_folded_with_the_message_line_ending() {
        let forwarder = Forwarder::new("mx", Arc::new(MemorySink::new())).with_hooks(
            Hooks::default().with_received(|_, _, _| Some("from a\n  by b  \nfor c;".to_string())),
        );

        let crlf = envelope(b"Subject: x\r\n\r\n");
        assert_eq!(
            forwarder.received_header(&crlf, peer(), None).unwrap(),
            "from a\r\n\tby b\r\n\tfor c;"
        );

        let lf = envelope(b"Subject: x\n\n");
        assert_eq!(
            forwarder.received_header(&lf, peer(), None).unwrap(),
            "from a\n\tby b\n\tfor c;"
        );
    }

    #[test]
    fn received_can_be_disabled() {
        let forwarder = Forwarder::new("mx", Arc::new(MemorySink::new()))
            .with_hooks(Hooks::default().with_received(|_, _, _| None));

        assert_eq!(
            forwarder.received_header(&envelope(b"Subject: x\r\n\r\n"), peer(), None),
            None
        );
    }
}
