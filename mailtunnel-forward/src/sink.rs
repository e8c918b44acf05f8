//! Where forwarded messages go.

use std::{
    fmt::Debug,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use mailtunnel_common::{Message, message::fix_eols, outgoing};
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;

use crate::error::{DeliveryError, PermanentError, TemporaryError};

/// Hands a finished message to the next hop.
#[async_trait]
pub trait DeliverySink: Send + Sync + Debug {
    /// Deliver `message` to `recipients`, with `sender` as MAIL FROM
    ///
    /// # Errors
    /// If the next hop does not take the message
    async fn deliver(
        &self,
        message: &Message,
        recipients: &[String],
        sender: &str,
    ) -> Result<(), DeliveryError>;
}

/// Log the hand-off, refusing it when there is nobody to hand it to
fn accept(message: &Message, recipients: &[String], sender: &str) -> Result<(), DeliveryError> {
    if recipients.is_empty() {
        return Err(PermanentError::RecipientsRefused(sender.to_string()).into());
    }

    outgoing!(
        level = INFO,
        "To: {recipients:?} From: {sender:?} Subject: {:?}",
        message.subject()
    );
    Ok(())
}

/// Prints every message instead of delivering it
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl DeliverySink for LogSink {
    async fn deliver(
        &self,
        message: &Message,
        recipients: &[String],
        sender: &str,
    ) -> Result<(), DeliveryError> {
        accept(message, recipients, sender)?;

        let now = chrono::Local::now().format(" %Y-%m-%d %H:%M:%S ").to_string();
        let mut out = format!("{now:=^79}\n").into_bytes();
        out.extend_from_slice(&message.as_bytes());
        out.push(b'\n');

        let mut stdout = tokio::io::stdout();
        stdout.write_all(&out).await?;
        stdout.flush().await?;
        Ok(())
    }
}

/// Writes every delivery to a directory, as `<timestamp>-<n>.eml` with a
/// `.rcpt` file next to it holding the envelope.
#[derive(Debug)]
pub struct DirectorySink {
    path: PathBuf,
    sequence: AtomicU64,
}

impl DirectorySink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl DeliverySink for DirectorySink {
    async fn deliver(
        &self,
        message: &Message,
        recipients: &[String],
        sender: &str,
    ) -> Result<(), DeliveryError> {
        accept(message, recipients, sender)?;
        tokio::fs::create_dir_all(&self.path).await?;

        let stem = format!(
            "{}-{}",
            chrono::Local::now().format("%Y-%m-%d_%H-%M-%S%.6f"),
            self.sequence.fetch_add(1, Ordering::Relaxed)
        );

        let mut envelope = format!("MAIL FROM:<{sender}>\n");
        for recipient in recipients {
            envelope.push_str(&format!("RCPT TO:<{recipient}>\n"));
        }

        tokio::fs::write(
            self.path.join(format!("{stem}.eml")),
            fix_eols(&message.as_bytes()),
        )
        .await?;
        tokio::fs::write(self.path.join(format!("{stem}.rcpt")), envelope).await?;

        Ok(())
    }
}

/// One call to [`DeliverySink::deliver`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivery {
    pub message: Message,
    pub recipients: Vec<String>,
    pub sender: String,
}

/// Keeps every delivery in memory, for tests
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    deliveries: Arc<Mutex<Vec<Delivery>>>,
    /// Fail every delivery after this many succeeded
    capacity: Option<usize>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that accepts `capacity` deliveries and then fails
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            deliveries: Arc::default(),
            capacity: Some(capacity),
        }
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.deliveries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DeliverySink for MemorySink {
    async fn deliver(
        &self,
        message: &Message,
        recipients: &[String],
        sender: &str,
    ) -> Result<(), DeliveryError> {
        let mut deliveries = self.deliveries.lock();
        if let Some(capacity) = self.capacity
            && deliveries.len() >= capacity
        {
            return Err(TemporaryError::Unavailable(format!(
                "Memory sink capacity exceeded: {capacity} deliveries"
            ))
            .into());
        }

        accept(message, recipients, sender)?;
        deliveries.push(Delivery {
            message: message.clone(),
            recipients: recipients.to_vec(),
            sender: sender.to_string(),
        });
        Ok(())
    }
}
