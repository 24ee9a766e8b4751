use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::MailConfig;

/// A single templated message ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("invalid mailbox address '{0}'")]
    Address(String),
    #[error("mail transport failure: {0}")]
    Transport(String),
    #[error("timed out waiting for the mail transport")]
    Timeout,
}

/// Outbound email seam. Constructed explicitly and injected into the
/// gateway, never a module-level singleton; the gateway only needs "send
/// this message, tell me if it worked".
pub trait Mailer: Send + Sync {
    fn send(&self, email: OutboundEmail) -> impl Future<Output = Result<(), MailError>> + Send;
}

/// Production mailer over an async SMTP relay, configured from environment.
/// Every send is bounded by the configured timeout; expiry is reported as a
/// transport failure rather than leaving the caller suspended.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    timeout: Duration,
}

impl SmtpMailer {
    pub fn from_config(config: &MailConfig) -> Result<Self, MailError> {
        let builder = if config.smtp_secure {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
        }
        .map_err(|err| MailError::Transport(err.to_string()))?;

        let mut builder = builder.port(config.smtp_port);
        if !config.smtp_user.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.smtp_user.clone(),
                config.smtp_password.clone(),
            ));
        }

        let from = format!("{} <{}>", config.from_name, config.from_email)
            .parse::<Mailbox>()
            .map_err(|_| MailError::Address(config.from_email.clone()))?;

        Ok(Self {
            transport: builder.build(),
            from,
            timeout: config.send_timeout,
        })
    }
}

impl Mailer for SmtpMailer {
    async fn send(&self, email: OutboundEmail) -> Result<(), MailError> {
        let to = email
            .to
            .parse::<Mailbox>()
            .map_err(|_| MailError::Address(email.to.clone()))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject)
            .header(ContentType::TEXT_HTML)
            .body(email.html_body)
            .map_err(|err| MailError::Transport(err.to_string()))?;

        match tokio::time::timeout(self.timeout, self.transport.send(message)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(err)) => Err(MailError::Transport(err.to_string())),
            Err(_) => Err(MailError::Timeout),
        }
    }
}

/// Recording mailer for tests and demos.
#[derive(Debug, Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<OutboundEmail>>,
    fail_sends: AtomicBool,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mailer whose sends all fail, for exercising dispatch failures.
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_sends: AtomicBool::new(true),
        }
    }

    pub fn sent(&self) -> Vec<OutboundEmail> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Mailer for MemoryMailer {
    async fn send(&self, email: OutboundEmail) -> Result<(), MailError> {
        if self.fail_sends.load(Ordering::Relaxed) {
            return Err(MailError::Transport(
                "in-memory mailer configured to fail".to_string(),
            ));
        }
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(email);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_email(to: &str) -> OutboundEmail {
        OutboundEmail {
            to: to.to_string(),
            subject: "hello".to_string(),
            html_body: "<p>hi</p>".to_string(),
        }
    }

    #[tokio::test]
    async fn memory_mailer_records_sends_in_order() {
        let mailer = MemoryMailer::new();
        mailer.send(sample_email("a@x.com")).await.expect("send a");
        mailer.send(sample_email("b@x.com")).await.expect("send b");

        let sent = mailer.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].to, "a@x.com");
        assert_eq!(sent[1].to, "b@x.com");
    }

    #[tokio::test]
    async fn failing_mailer_reports_transport_errors() {
        let mailer = MemoryMailer::failing();
        let err = mailer
            .send(sample_email("a@x.com"))
            .await
            .expect_err("send must fail");
        assert!(matches!(err, MailError::Transport(_)));
        assert!(mailer.sent().is_empty());
    }
}
