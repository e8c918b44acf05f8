//! Wires the alias engine into the forwarding pipeline for one organisation.
//!
//! Each envelope recipient in the organisation's domain is resolved by its
//! local part. The people it reaches are split by why they were reached, so
//! mailing `junta+best` sends one copy carrying the `JUNTA` list headers and
//! one carrying the `BEST` ones.

use std::sync::Arc;

use mailtunnel_alias::{ADMIN_GROUP, AliasError, Origin, Resolver};
use mailtunnel_common::{Envelope, Message, internal, sanity};
use mailtunnel_forward::{
    DeliveryError, DeliverySink, ExtraHeader, ForwardError, Hooks, TargetRecipient,
};
use parking_lot::Mutex;

use crate::config::OrganisationConfig;

pub struct Organisation {
    config: OrganisationConfig,
    resolver: Resolver,
    period: Mutex<Option<i32>>,
    notices: Mutex<Vec<Message>>,
}

impl std::fmt::Debug for Organisation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Organisation")
            .field("domain", &self.config.domain)
            .field("period", &*self.period.lock())
            .finish_non_exhaustive()
    }
}

/// An alias failure as the pipeline sees it: only unknown aliases are final
pub(crate) fn forward_error(err: AliasError) -> ForwardError {
    match err {
        AliasError::InvalidRecipient(names) => ForwardError::InvalidRecipient(names),
        err => ForwardError::Handling(err.to_string()),
    }
}

impl Organisation {
    pub fn new(config: OrganisationConfig, resolver: Resolver) -> Self {
        Self {
            config,
            resolver,
            period: Mutex::new(None),
            notices: Mutex::new(Vec::new()),
        }
    }

    pub fn domain(&self) -> &str {
        &self.config.domain
    }

    pub const fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    ///
    /// The current period, read afresh from the fact source. A failed read
    /// keeps the last value read; the configured fallback is only used when
    /// nothing was ever read.
    ///
    /// # Errors
    /// If there is neither a current nor a fallback period
    ///
    pub fn period(&self) -> Result<i32, ForwardError> {
        let mut cached = self.period.lock();
        *cached = self.resolver.current_period(*cached);

        cached
            .or(self.config.fallback_period)
            .ok_or_else(|| ForwardError::Handling(String::from("No current period is known")))
    }

    /// The envelope sender of every group delivery
    pub fn bounce_address(&self) -> String {
        format!("{}@{}", self.config.bounce_local_part, self.config.domain)
    }

    fn list_admin(&self) -> String {
        format!("{}@{}", ADMIN_GROUP.to_lowercase(), self.config.domain)
    }

    /// Everyone told about messages that could not be handled
    pub fn admin_emails(&self) -> Vec<String> {
        self.resolver.admin_emails(&self.config.admins)
    }

    ///
    /// Resolve one envelope recipient into a delivery unit per origin, in the
    /// order the origins first show up.
    ///
    /// # Errors
    /// [`ForwardError::InvalidRecipient`] for addresses outside the domain or
    /// aliases that reach nobody, [`ForwardError::NoRecipients`] when the
    /// people reached have no usable address, [`ForwardError::Handling`]
    /// otherwise.
    ///
    pub fn translate_recipient(&self, rcpt_to: &str) -> Result<Vec<TargetRecipient>, ForwardError> {
        let Some((local, domain)) = rcpt_to.rsplit_once('@') else {
            return Err(ForwardError::invalid(rcpt_to));
        };

        if !domain.eq_ignore_ascii_case(&self.config.domain) {
            internal!(level = DEBUG, "{rcpt_to} is not in {}", self.config.domain);
            return Err(ForwardError::invalid(rcpt_to));
        }

        let period = self.period()?;
        let translated = self
            .resolver
            .translate_recipient_with_origins(period, local)
            .map_err(forward_error)?;

        if translated.is_empty() {
            internal!(level = WARN, "{rcpt_to} reaches nobody with an address");
            return Err(ForwardError::NoRecipients(rcpt_to.to_string()));
        }

        let mut groups: Vec<(Origin, Vec<String>)> = Vec::new();
        for (address, origin) in translated {
            match groups.iter_mut().find(|(seen, _)| *seen == origin) {
                Some((_, addresses)) => addresses.push(address),
                None => groups.push((origin, vec![address])),
            }
        }

        Ok(groups
            .into_iter()
            .map(|(origin, addresses)| TargetRecipient::group(origin.to_string(), addresses))
            .collect())
    }

    ///
    /// Why `envelope` should not be forwarded at all, if it shouldn't.
    ///
    /// Bounces and delivery reports sent to an alias are dropped, forwarding
    /// them to a whole group only starts another round of bounces.
    ///
    pub fn reject(&self, envelope: &Envelope) -> Option<String> {
        let message = envelope.message();

        let unknown_8bit = message.get_all_headers("Subject").into_iter().any(|raw| {
            String::from_utf8_lossy(raw)
                .to_ascii_lowercase()
                .contains("=?unknown-8bit?")
        });
        if unknown_8bit {
            return Some(String::from("Subject in the unknown-8bit charset"));
        }

        if message.subject().trim() == "Undelivered Mail Returned to Sender" {
            return Some(String::from("Bounce"));
        }

        let report = message.get_header("Content-Type").is_some_and(|value| {
            let value = value.to_ascii_lowercase();
            value.trim_start().starts_with("multipart/report")
                && value.contains("report-type=delivery-status")
        });
        if report {
            return Some(String::from("Delivery status report"));
        }

        None
    }

    /// Tag the subject, unless it is tagged already or a signature covers it
    pub fn translate_subject(&self, envelope: &Envelope) -> Option<String> {
        let message = envelope.message();
        if message.get_header("DKIM-Signature").is_some() {
            return None;
        }

        let subject = message.subject();
        if subject.contains(&format!("[{}", self.config.subject_tag)) {
            None
        } else {
            Some(format!("[{}] {subject}", self.config.subject_tag))
        }
    }

    /// The value of `header` for a delivery to `target`
    pub fn extra_header(&self, header: ExtraHeader, target: &TargetRecipient) -> Option<String> {
        let TargetRecipient::Group(group) = target else {
            return None;
        };

        let list = group.name.to_lowercase();
        let domain = &self.config.domain;
        let admin = self.list_admin();

        Some(match header {
            ExtraHeader::Sender => format!("{list}-bounces@{domain}"),
            ExtraHeader::ListId => format!("<{list}.{domain}>"),
            ExtraHeader::ListUnsubscribe => format!("<mailto:{admin}?subject=unsubscribe>"),
            ExtraHeader::ListHelp => format!("<mailto:{admin}?subject=list-help>"),
            ExtraHeader::ListSubscribe => format!("<mailto:{admin}?subject=subscribe>"),
        })
    }

    ///
    /// Keep a message that could not be handled and queue a notice to the
    /// administrators. The notice goes out with [`Organisation::flush_notices`].
    ///
    /// # Errors
    /// If the message could not be stored
    ///
    pub fn handle_error(&self, envelope: Option<&Envelope>, raw: &[u8]) -> Result<(), String> {
        let directory = &self.config.error_directory;
        let path = directory.join(format!("{}.mail", sanity::now_string()));

        let stored = std::fs::create_dir_all(directory).and_then(|()| std::fs::write(&path, raw));

        let sender = envelope.map_or("<unknown>", Envelope::sender);
        let body = format!(
            "A message from {sender} to {} could not be handled.\n\n{}\n",
            envelope.map_or_else(String::new, |envelope| envelope.rcpt_to().join(", ")),
            match &stored {
                Ok(()) => format!("It has been kept in {}.", path.display()),
                Err(err) => format!("It could not be kept in {}: {err}", path.display()),
            }
        );

        let admins = self.admin_emails();
        if admins.is_empty() {
            internal!(level = WARN, "Nobody to tell about the failed message from {sender}");
        } else {
            self.notices.lock().push(Message::compose(
                &self.bounce_address(),
                &admins.join(", "),
                &format!("[{}] Error handling message", self.config.subject_tag),
                &body,
                None,
            ));
        }

        stored.map_err(|err| format!("Could not store message in {}: {err}", path.display()))
    }

    /// Notices waiting to be sent
    pub fn pending_notices(&self) -> usize {
        self.notices.lock().len()
    }

    ///
    /// Send every queued administrator notice through `sink`.
    ///
    /// # Errors
    /// The first failed delivery. Notices not yet sent are dropped.
    ///
    pub async fn flush_notices(&self, sink: &dyn DeliverySink) -> Result<(), DeliveryError> {
        let notices = std::mem::take(&mut *self.notices.lock());
        if notices.is_empty() {
            return Ok(());
        }

        let admins = self.admin_emails();
        let sender = self.bounce_address();
        for notice in notices {
            sink.deliver(&notice, &admins, &sender).await?;
        }

        Ok(())
    }

    /// The pipeline hooks for this organisation
    pub fn hooks(self: &Arc<Self>) -> Hooks {
        let mut hooks = Hooks::default()
            .with_reject({
                let organisation = Arc::clone(self);
                move |envelope| organisation.reject(envelope)
            })
            .with_translate_recipient({
                let organisation = Arc::clone(self);
                move |rcpt_to| organisation.translate_recipient(rcpt_to)
            })
            .with_translate_subject({
                let organisation = Arc::clone(self);
                move |envelope| organisation.translate_subject(envelope)
            })
            .with_mail_from({
                let organisation = Arc::clone(self);
                move |envelope, target| match target {
                    Some(_) => organisation.bounce_address(),
                    None => envelope.sender().to_string(),
                }
            })
            .with_error({
                let organisation = Arc::clone(self);
                move |envelope, raw| organisation.handle_error(envelope, raw)
            });

        for header in ExtraHeader::ALL {
            let organisation = Arc::clone(self);
            hooks = hooks.with_extra_header(header, move |_, target| {
                organisation.extra_header(header, target)
            });
        }

        hooks
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use mailtunnel_alias::{Resolver, StaticFacts};
    use mailtunnel_common::{Envelope, Message};
    use mailtunnel_forward::{ExtraHeader, ForwardError, MemorySink, TargetRecipient};
    use pretty_assertions::assert_eq;

    use super::Organisation;
    use crate::config::OrganisationConfig;

    const FACTS: &str = r#"(
        current_period: Some(2013),
        groups: [
            (id: 1, name: "JUNTA", pattern: "JUNTA", members: [1, 2]),
            (id: 2, name: "ADMIN", pattern: "ADMIN", members: [3]),
        ],
        titles: [(person: 2, kind: "BEST", root: "FORM", period: 2013)],
        people: [
            (id: 1, email: Some("one@example.net")),
            (id: 2, email: Some("two@example.net")),
            (id: 3, email: Some("three@example.net")),
        ],
    )"#;

    fn organisation_with(facts: StaticFacts, error_directory: &std::path::Path) -> Organisation {
        let config = OrganisationConfig {
            domain: String::from("taagekammeret.dk"),
            subject_tag: String::from("TK"),
            admins: vec![String::from("fallback@example.net")],
            fallback_period: Some(2010),
            bounce_local_part: String::from("admin"),
            error_directory: error_directory.to_path_buf(),
        };

        Organisation::new(config, Resolver::new(Arc::new(facts)).unwrap())
    }

    fn organisation() -> Organisation {
        organisation_with(ron::from_str(FACTS).unwrap(), std::path::Path::new("error"))
    }

    fn envelope(headers: &str) -> Envelope {
        Envelope::new(
            Message::parse(format!("{headers}\r\n\r\nbody\r\n").as_bytes()).unwrap(),
            String::from("sender@example.net"),
            vec![String::from("junta@taagekammeret.dk")],
        )
    }

    #[test]
    fn recipients_are_split_by_origin() {
        let targets = organisation()
            .translate_recipient("junta+form@TaageKammeret.dk")
            .unwrap();

        // person 2 is in both; the later origin wins
        assert_eq!(
            targets,
            vec![
                TargetRecipient::group("JUNTA", vec![String::from("one@example.net")]),
                TargetRecipient::group("FORM2013", vec![String::from("two@example.net")]),
            ]
        );
    }

    #[test]
    fn foreign_and_unknown_recipients_are_invalid() {
        let organisation = organisation();

        assert!(matches!(
            organisation.translate_recipient("junta@example.org"),
            Err(ForwardError::InvalidRecipient(names)) if names == ["junta@example.org"]
        ));
        assert!(matches!(
            organisation.translate_recipient("nobody"),
            Err(ForwardError::InvalidRecipient(_))
        ));
        assert!(matches!(
            organisation.translate_recipient("hest+ko@taagekammeret.dk"),
            Err(ForwardError::InvalidRecipient(names)) if names == ["HEST", "KO"]
        ));
    }

    #[test]
    fn alias_without_addresses_is_an_error() {
        let facts = ron::from_str(
            r#"(
                current_period: Some(2013),
                groups: [(id: 5, name: "GHOST", pattern: "GHOST", members: [77])],
                people: [(id: 77, email: None)],
            )"#,
        )
        .unwrap();
        let organisation = organisation_with(facts, std::path::Path::new("error"));

        assert!(matches!(
            organisation.translate_recipient("ghost@taagekammeret.dk"),
            Err(ForwardError::NoRecipients(rcpt_to)) if rcpt_to == "ghost@taagekammeret.dk"
        ));
    }

    #[test]
    fn period_falls_back_until_one_is_read() {
        let empty = organisation_with(StaticFacts::default(), std::path::Path::new("error"));
        assert_eq!(empty.period().unwrap(), 2010);

        assert_eq!(organisation().period().unwrap(), 2013);
    }

    #[test]
    fn subject_tagging() {
        let organisation = organisation();

        assert_eq!(
            organisation.translate_subject(&envelope("Subject: Hej")),
            Some(String::from("[TK] Hej"))
        );
        assert_eq!(organisation.translate_subject(&envelope("Subject: Re: [TK] Hej")), None);
        assert_eq!(organisation.translate_subject(&envelope("Subject: [TK-ADMIN] Hej")), None);
        assert_eq!(
            organisation.translate_subject(&envelope("DKIM-Signature: v=1\r\nSubject: Hej")),
            None
        );
    }

    #[test]
    fn bounces_are_rejected() {
        let organisation = organisation();

        assert!(
            organisation
                .reject(&envelope("Subject: =?unknown-8bit?b?VW5k?="))
                .is_some()
        );
        assert!(
            organisation
                .reject(&envelope("Subject: Undelivered Mail Returned to Sender"))
                .is_some()
        );
        assert!(
            organisation
                .reject(&envelope(
                    "Subject: Hej\r\nContent-Type: multipart/report; report-type=delivery-status; boundary=x"
                ))
                .is_some()
        );

        assert_eq!(organisation.reject(&envelope("Subject: Hej")), None);
        assert_eq!(
            organisation.reject(&envelope("Subject: =?UTF-8?Q?Gl=C3=A6delig_jul?=")),
            None
        );
        assert_eq!(
            organisation.reject(&envelope("Subject: Re: Undelivered Mail Returned to Sender")),
            None
        );
        assert_eq!(
            organisation.reject(&envelope("Subject: Hej\r\nContent-Type: multipart/mixed; boundary=x")),
            None
        );
    }

    #[test]
    fn list_headers() {
        let organisation = organisation();
        let group = TargetRecipient::group("JUNTA", Vec::new());

        let headers: Vec<_> = ExtraHeader::ALL
            .into_iter()
            .map(|header| organisation.extra_header(header, &group).unwrap())
            .collect();

        assert_eq!(
            headers,
            vec![
                "junta-bounces@taagekammeret.dk",
                "<junta.taagekammeret.dk>",
                "<mailto:admin@taagekammeret.dk?subject=unsubscribe>",
                "<mailto:admin@taagekammeret.dk?subject=list-help>",
                "<mailto:admin@taagekammeret.dk?subject=subscribe>",
            ]
        );
        assert_eq!(
            organisation.extra_header(ExtraHeader::ListId, &TargetRecipient::from("a@b")),
            None
        );
    }

    #[test]
    fn admins_come_from_the_admin_group() {
        assert_eq!(organisation().admin_emails(), vec!["three@example.net"]);

        let without = organisation_with(StaticFacts::default(), std::path::Path::new("error"));
        assert_eq!(without.admin_emails(), vec!["fallback@example.net"]);
    }

    #[tokio::test]
    async fn errors_are_kept_and_reported() {
        let dir = tempfile::tempdir().unwrap();
        let organisation = organisation_with(ron::from_str(FACTS).unwrap(), dir.path());
        let envelope = envelope("Subject: Hej");

        organisation
            .handle_error(Some(&envelope), b"Subject: Hej\r\n\r\nbody\r\n")
            .unwrap();

        let kept: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(kept.len(), 1);
        assert_eq!(organisation.pending_notices(), 1);

        let sink = MemorySink::new();
        organisation.flush_notices(&sink).await.unwrap();

        let deliveries = sink.deliveries();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].recipients, vec!["three@example.net"]);
        assert_eq!(deliveries[0].sender, "admin@taagekammeret.dk");
        assert!(
            deliveries[0]
                .message
                .body_text()
                .unwrap()
                .contains("sender@example.net")
        );
        assert_eq!(organisation.pending_notices(), 0);
    }
}
