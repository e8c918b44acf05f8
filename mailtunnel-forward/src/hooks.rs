//! Per-deployment customisation of the forwarding pipeline.
//!
//! Every hook is optional. An unset hook falls back to the plain forwarding
//! behaviour documented on its setter.

use std::{
    fmt::{self, Debug, Display},
    net::SocketAddr,
};

use mailtunnel_common::Envelope;

use crate::{error::ForwardError, target::TargetRecipient};

pub type RejectHook = Box<dyn Fn(&Envelope) -> Option<String> + Send + Sync>;
pub type TranslateRecipientHook =
    Box<dyn Fn(&str) -> Result<Vec<TargetRecipient>, ForwardError> + Send + Sync>;
pub type TranslateSubjectHook = Box<dyn Fn(&Envelope) -> Option<String> + Send + Sync>;
pub type MailFromHook = Box<dyn Fn(&Envelope, Option<&TargetRecipient>) -> String + Send + Sync>;
pub type ReceivedHook =
    Box<dyn Fn(&Envelope, SocketAddr, Option<&TargetRecipient>) -> Option<String> + Send + Sync>;
pub type GroupRecipientsHook = Box<dyn Fn(&TargetRecipient) -> Vec<String> + Send + Sync>;
pub type HeaderHook = Box<dyn Fn(&Envelope, &TargetRecipient) -> Option<String> + Send + Sync>;
pub type InvalidRecipientHook = Box<dyn Fn(&Envelope, &ForwardError) + Send + Sync>;
pub type ErrorHook = Box<dyn Fn(Option<&Envelope>, &[u8]) -> Result<(), String> + Send + Sync>;

/// The headers attached to each grouped delivery, in the order they are set
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExtraHeader {
    Sender,
    ListId,
    ListUnsubscribe,
    ListHelp,
    ListSubscribe,
}

impl ExtraHeader {
    pub const ALL: [Self; 5] = [
        Self::Sender,
        Self::ListId,
        Self::ListUnsubscribe,
        Self::ListHelp,
        Self::ListSubscribe,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Sender => "Sender",
            Self::ListId => "List-Id",
            Self::ListUnsubscribe => "List-Unsubscribe",
            Self::ListHelp => "List-Help",
            Self::ListSubscribe => "List-Subscribe",
        }
    }
}

impl Display for ExtraHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Default)]
pub struct Hooks {
    reject: Option<RejectHook>,
    translate_recipient: Option<TranslateRecipientHook>,
    translate_subject: Option<TranslateSubjectHook>,
    mail_from: Option<MailFromHook>,
    received: Option<ReceivedHook>,
    group_recipients: Option<GroupRecipientsHook>,
    extra_headers: [Option<HeaderHook>; ExtraHeader::ALL.len()],
    invalid_recipient: Option<InvalidRecipientHook>,
    error: Option<ErrorHook>,
}

impl Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let extra: Vec<_> = ExtraHeader::ALL
            .iter()
            .filter(|header| self.extra_headers[**header as usize].is_some())
            .collect();

        f.debug_struct("Hooks")
            .field("reject", &self.reject.is_some())
            .field("translate_recipient", &self.translate_recipient.is_some())
            .field("translate_subject", &self.translate_subject.is_some())
            .field("mail_from", &self.mail_from.is_some())
            .field("received", &self.received.is_some())
            .field("group_recipients", &self.group_recipients.is_some())
            .field("extra_headers", &extra)
            .field("invalid_recipient", &self.invalid_recipient.is_some())
            .field("error", &self.error.is_some())
            .finish()
    }
}

impl Hooks {
    /// Drop a message before any recipient is translated. The hook returns
    /// why; a dropped message is logged and answered as accepted so that the
    /// sender does not bounce it again. Without it nothing is dropped.
    #[must_use]
    pub fn with_reject(
        mut self,
        hook: impl Fn(&Envelope) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.reject = Some(Box::new(hook));
        self
    }

    /// Map one envelope recipient to its targets. Without it every recipient
    /// is forwarded as is.
    #[must_use]
    pub fn with_translate_recipient(
        mut self,
        hook: impl Fn(&str) -> Result<Vec<TargetRecipient>, ForwardError> + Send + Sync + 'static,
    ) -> Self {
        self.translate_recipient = Some(Box::new(hook));
        self
    }

    /// Replace the subject when the hook returns one
    #[must_use]
    pub fn with_translate_subject(
        mut self,
        hook: impl Fn(&Envelope) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.translate_subject = Some(Box::new(hook));
        self
    }

    /// The MAIL FROM for a delivery, `None` for a flat delivery. Without it the
    /// received envelope sender is kept.
    #[must_use]
    pub fn with_mail_from(
        mut self,
        hook: impl Fn(&Envelope, Option<&TargetRecipient>) -> String + Send + Sync + 'static,
    ) -> Self {
        self.mail_from = Some(Box::new(hook));
        self
    }

    /// The text of the trace header for a delivery, `None` to add none.
    /// Without it a standard `from`/`by`/`for` trace is added.
    #[must_use]
    pub fn with_received(
        mut self,
        hook: impl Fn(&Envelope, SocketAddr, Option<&TargetRecipient>) -> Option<String>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.received = Some(Box::new(hook));
        self
    }

    /// Expand a delivery unit into addresses. Without it a group expands to its
    /// addresses and a plain address to itself.
    #[must_use]
    pub fn with_group_recipients(
        mut self,
        hook: impl Fn(&TargetRecipient) -> Vec<String> + Send + Sync + 'static,
    ) -> Self {
        self.group_recipients = Some(Box::new(hook));
        self
    }

    /// Set `header` on every grouped delivery the hook returns a value for
    #[must_use]
    pub fn with_extra_header(
        mut self,
        header: ExtraHeader,
        hook: impl Fn(&Envelope, &TargetRecipient) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.extra_headers[header as usize] = Some(Box::new(hook));
        self
    }

    /// Called after an envelope is rejected for its recipients
    #[must_use]
    pub fn with_invalid_recipient(
        mut self,
        hook: impl Fn(&Envelope, &ForwardError) + Send + Sync + 'static,
    ) -> Self {
        self.invalid_recipient = Some(Box::new(hook));
        self
    }

    /// Called with the raw message whenever handling fails, along with the
    /// envelope if one could be built
    #[must_use]
    pub fn with_error(
        mut self,
        hook: impl Fn(Option<&Envelope>, &[u8]) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.error = Some(Box::new(hook));
        self
    }

    pub(crate) fn reject(&self, envelope: &Envelope) -> Option<String> {
        self.reject.as_ref().and_then(|hook| hook(envelope))
    }

    pub(crate) fn translate_recipient(
        &self,
        rcpt_to: &str,
    ) -> Result<Vec<TargetRecipient>, ForwardError> {
        self.translate_recipient.as_ref().map_or_else(
            || Ok(vec![TargetRecipient::from(rcpt_to)]),
            |hook| hook(rcpt_to),
        )
    }

    pub(crate) fn translate_subject(&self, envelope: &Envelope) -> Option<String> {
        self.translate_subject.as_ref().and_then(|hook| hook(envelope))
    }

    pub(crate) fn mail_from(&self, envelope: &Envelope, target: Option<&TargetRecipient>) -> String {
        self.mail_from.as_ref().map_or_else(
            || envelope.sender().to_string(),
            |hook| hook(envelope, target),
        )
    }

    /// `None` when there is no hook, `Some(None)` when the hook wants no trace
    pub(crate) fn received(
        &self,
        envelope: &Envelope,
        peer: SocketAddr,
        target: Option<&TargetRecipient>,
    ) -> Option<Option<String>> {
        self.received
            .as_ref()
            .map(|hook| hook(envelope, peer, target))
    }

    pub(crate) fn group_recipients(&self, target: &TargetRecipient) -> Vec<String> {
        self.group_recipients
            .as_ref()
            .map_or_else(|| target.addresses(), |hook| hook(target))
    }

    /// The extra headers for `target`, in [`ExtraHeader::ALL`] order
    pub(crate) fn extra_headers(
        &self,
        envelope: &Envelope,
        target: &TargetRecipient,
    ) -> Vec<(ExtraHeader, String)> {
        ExtraHeader::ALL
            .into_iter()
            .filter_map(|header| {
                self.extra_headers[header as usize]
                    .as_ref()
                    .and_then(|hook| hook(envelope, target))
                    .map(|value| (header, value))
            })
            .collect()
    }

    pub(crate) fn invalid_recipient(&self, envelope: &Envelope, error: &ForwardError) {
        if let Some(hook) = &self.invalid_recipient {
            hook(envelope, error);
        }
    }

    pub(crate) fn error(&self, envelope: Option<&Envelope>, raw: &[u8]) -> Result<(), String> {
        self.error
            .as_ref()
            .map_or(Ok(()), |hook| hook(envelope, raw))
    }
}

#[cfg(test)]
mod test {
    use mailtunnel_common::{Envelope, Message};
    use pretty_assertions::assert_eq;

    use super::{ExtraHeader, Hooks};
    use crate::target::TargetRecipient;

    fn envelope() -> Envelope {
        Envelope::new(
            Message::parse(b"Subject: hi\r\n\r\nbody\r\n").unwrap(),
            "sender@example.org".to_string(),
            vec!["rcpt@example.org".to_string()],
        )
    }

    #[test]
    fn defaults() {
        let hooks = Hooks::default();
        let envelope = envelope();
        let group = TargetRecipient::group("G", vec!["a@example.org".to_string()]);

        assert_eq!(
            hooks.translate_recipient("x@example.org").unwrap(),
            vec![TargetRecipient::from("x@example.org")]
        );
        assert_eq!(hooks.reject(&envelope), None);
        assert_eq!(hooks.translate_subject(&envelope), None);
        assert_eq!(hooks.mail_from(&envelope, Some(&group)), "sender@example.org");
        assert_eq!(hooks.group_recipients(&group), vec!["a@example.org"]);
        assert!(hooks.extra_headers(&envelope, &group).is_empty());
        assert!(hooks.error(None, b"").is_ok());
    }

    #[test]
    fn extra_headers_keep_their_order() {
        let hooks = Hooks::default()
            .with_extra_header(ExtraHeader::ListSubscribe, |_, _| Some("sub".to_string()))
            .with_extra_header(ExtraHeader::ListHelp, |_, _| None)
            .with_extra_header(ExtraHeader::Sender, |_, target| Some(target.to_string()));
        let group = TargetRecipient::group("G", Vec::new());

        assert_eq!(
            hooks.extra_headers(&envelope(), &group),
            vec![
                (ExtraHeader::Sender, "G ()".to_string()),
                (ExtraHeader::ListSubscribe, "sub".to_string()),
            ]
        );
    }
}
