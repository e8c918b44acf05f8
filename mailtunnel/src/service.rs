use std::{net::SocketAddr, sync::Arc};

use mailtunnel_alias::Origin;
use mailtunnel_common::{Reply, internal};
use mailtunnel_forward::{DeliverySink, ForwardError, Forwarder};

use crate::organisation::{Organisation, forward_error};

/// A configured forwarder, ready to take messages
#[derive(Debug)]
pub struct Service {
    forwarder: Forwarder,
    organisation: Arc<Organisation>,
    sink: Arc<dyn DeliverySink>,
}

impl Service {
    pub(crate) fn new(
        forwarder: Forwarder,
        organisation: Arc<Organisation>,
        sink: Arc<dyn DeliverySink>,
    ) -> Self {
        Self {
            forwarder,
            organisation,
            sink,
        }
    }

    pub const fn forwarder(&self) -> &Forwarder {
        &self.forwarder
    }

    pub fn organisation(&self) -> &Organisation {
        &self.organisation
    }

    ///
    /// Forward one message and tell the administrators about it if that
    /// failed. The reply is what the transport should answer.
    ///
    pub async fn deliver(
        &self,
        peer: SocketAddr,
        mail_from: &str,
        rcpt_to: &[String],
        data: &[u8],
    ) -> Reply {
        let reply = self
            .forwarder
            .process_message(peer, mail_from, rcpt_to, data)
            .await;

        if let Err(err) = self.organisation.flush_notices(self.sink.as_ref()).await {
            internal!(level = ERROR, "Could not notify administrators: {err}");
        }

        reply
    }

    ///
    /// Who `name` reaches right now, and why.
    ///
    /// # Errors
    /// If there is no current period, or `name` cannot be resolved
    ///
    #[tracing::instrument(skip(self))]
    pub fn resolve(&self, name: &str) -> Result<Vec<(String, Origin)>, ForwardError> {
        let period = self.organisation.period()?;

        self.organisation
            .resolver()
            .translate_recipient_with_origins(period, name)
            .map_err(forward_error)
    }
}
