use std::{
    collections::HashSet,
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{MailConfig, MailTransportKind, SmtpConfig};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid mail address {address}: {reason}")]
    Address { address: String, reason: String },
    #[error("could not build message: {0}")]
    Message(#[from] lettre::error::Error),
    #[error("smtp delivery failed: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error("mail transport not configured: {0}")]
    NotConfigured(String),
    #[error("recipient {0} rejected")]
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub name: Option<String>,
    pub email: String,
}

impl Contact {
    pub fn new(name: Option<String>, email: impl Into<String>) -> Self {
        Self {
            name,
            email: email.into(),
        }
    }

    fn mailbox(&self) -> Result<Mailbox, TransportError> {
        let address: Address =
            self.email
                .parse()
                .map_err(|err: lettre::address::AddressError| TransportError::Address {
                    address: self.email.clone(),
                    reason: err.to_string(),
                })?;
        Ok(Mailbox::new(self.name.clone(), address))
    }
}

#[derive(Debug, Clone)]
pub struct OutgoingMail {
    pub from: Contact,
    pub to: Contact,
    pub subject: String,
    pub html: String,
}

/// Reference handed back by the transport for a delivered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRef(pub String);

impl fmt::Display for MessageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> Result<MessageRef, TransportError>;
}

/// Hands out a transport handle. Called once per workflow invocation.
#[async_trait]
pub trait MailConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn MailTransport>, TransportError>;
}

pub fn connector_from_config(config: &MailConfig) -> Result<Arc<dyn MailConnector>, TransportError> {
    match config.transport {
        MailTransportKind::Log => Ok(Arc::new(LogMailConnector)),
        MailTransportKind::Smtp => {
            let smtp = config
                .smtp
                .clone()
                .ok_or_else(|| TransportError::NotConfigured("SMTP_HOST is not set".into()))?;
            Ok(Arc::new(SmtpMailConnector::new(smtp)))
        }
    }
}

#[derive(Clone)]
pub struct SmtpMailConnector {
    config: SmtpConfig,
}

impl SmtpMailConnector {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    fn build_transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, TransportError> {
        let builder = if self.config.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.config.host)
        };
        let builder = builder.port(self.config.port);
        let builder = match (&self.config.username, &self.config.password) {
            (Some(username), Some(password)) => {
                builder.credentials(Credentials::new(username.clone(), password.clone()))
            }
            _ => builder,
        };
        Ok(builder.build())
    }
}

#[async_trait]
impl MailConnector for SmtpMailConnector {
    async fn connect(&self) -> Result<Arc<dyn MailTransport>, TransportError> {
        let transport = self.build_transport()?;
        debug!(host = %self.config.host, port = self.config.port, "smtp transport ready");
        Ok(Arc::new(SmtpMailTransport { transport }))
    }
}

pub struct SmtpMailTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    async fn send(&self, mail: OutgoingMail) -> Result<MessageRef, TransportError> {
        let message = Message::builder()
            .from(mail.from.mailbox()?)
            .to(mail.to.mailbox()?)
            .subject(mail.subject)
            .header(ContentType::TEXT_HTML)
            .body(mail.html)?;
        let response = self.transport.send(message).await?;
        Ok(MessageRef(response.message().collect::<Vec<_>>().join(" ")))
    }
}

/// Development transport: logs each mail instead of delivering it.
#[derive(Clone, Debug, Default)]
pub struct LogMailConnector;

#[async_trait]
impl MailConnector for LogMailConnector {
    async fn connect(&self) -> Result<Arc<dyn MailTransport>, TransportError> {
        Ok(Arc::new(LogMailTransport))
    }
}

#[derive(Clone, Debug, Default)]
pub struct LogMailTransport;

#[async_trait]
impl MailTransport for LogMailTransport {
    async fn send(&self, mail: OutgoingMail) -> Result<MessageRef, TransportError> {
        // Still reject what SMTP would reject.
        mail.from.mailbox()?;
        mail.to.mailbox()?;
        let reference = MessageRef(format!("log-{}", Uuid::new_v4()));
        info!(
            message_ref = %reference,
            to = %mail.to.email,
            subject = %mail.subject,
            "📧 mail (log transport)"
        );
        debug!(html = %mail.html, "mail body");
        Ok(reference)
    }
}

/// In-process transport that records every delivered mail.
///
/// Recipients registered with [`MemoryMailConnector::fail_for`] are rejected.
#[derive(Clone, Default)]
pub struct MemoryMailConnector {
    inner: Arc<MemoryMailbox>,
}

#[derive(Default)]
struct MemoryMailbox {
    sent: Mutex<Vec<OutgoingMail>>,
    failing: Mutex<HashSet<String>>,
    connects: AtomicUsize,
}

impl MemoryMailConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, email: impl Into<String>) {
        lock(&self.inner.failing).insert(email.into());
    }

    pub fn sent(&self) -> Vec<OutgoingMail> {
        lock(&self.inner.sent).clone()
    }

    pub fn sent_to(&self, email: &str) -> Vec<OutgoingMail> {
        self.sent()
            .into_iter()
            .filter(|mail| mail.to.email == email)
            .collect()
    }

    pub fn connects(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MailConnector for MemoryMailConnector {
    async fn connect(&self) -> Result<Arc<dyn MailTransport>, TransportError> {
        self.inner.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(self.clone()))
    }
}

#[async_trait]
impl MailTransport for MemoryMailConnector {
    async fn send(&self, mail: OutgoingMail) -> Result<MessageRef, TransportError> {
        if lock(&self.inner.failing).contains(&mail.to.email) {
            return Err(TransportError::Rejected(mail.to.email));
        }
        let mut sent = lock(&self.inner.sent);
        sent.push(mail);
        Ok(MessageRef(format!("memory-{}", sent.len())))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
