/// Alert notification over SMTP
use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use log::{info, warn};
use thiserror::Error;
use time::OffsetDateTime;

use crate::alert::message::{build_alert, AlertLimits, AlertMessage};
use crate::models::StatusFlag;
use crate::utils::format_timestamp;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("invalid mail address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("could not build alert mail: {0}")]
    Build(#[from] lettre::error::Error),
    #[error("mail submission failed: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
}

/// Outbound channel for alert messages
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &AlertMessage) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub recipient: String,
}

/// Submits alerts over implicit TLS with login credentials
pub struct SmtpNotifier {
    from: Mailbox,
    to: Mailbox,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpNotifier {
    pub fn new(settings: &SmtpSettings) -> Result<Self, NotifyError> {
        let from: Mailbox = settings.user.parse()?;
        let to: Mailbox = settings.recipient.parse()?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)?
            .port(settings.port)
            .credentials(Credentials::new(
                settings.user.clone(),
                settings.password.clone(),
            ))
            .build();

        Ok(SmtpNotifier {
            from,
            to,
            transport,
        })
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, message: &AlertMessage) -> Result<(), NotifyError> {
        let email = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(message.subject.clone())
            .multipart(MultiPart::alternative_plain_html(
                message.text_body.clone(),
                message.html_body.clone(),
            ))?;

        self.transport.send(email).await?;
        Ok(())
    }
}

pub struct AlertDispatcher<N> {
    notifier: N,
    limits: AlertLimits,
}

impl<N: Notifier> AlertDispatcher<N> {
    pub fn new(notifier: N, limits: AlertLimits) -> Self {
        AlertDispatcher { notifier, limits }
    }

    /// Format and submit an alert for an out-of-range reading
    ///
    /// A submission failure is logged and returned. It never stops the
    /// caller from halting.
    ///
    /// # Arguments
    /// * `temperature` - Temperature of the alerting reading
    /// * `current` - Simulated current of the alerting reading
    /// * `status` - Classification that triggered the alert
    pub async fn dispatch(
        &self,
        temperature: f64,
        current: f64,
        status: StatusFlag,
    ) -> Result<(), NotifyError> {
        let timestamp = format_timestamp(&OffsetDateTime::now_utc());
        let message = build_alert(status, temperature, current, &timestamp, &self.limits);

        info!("Sending alert mail: {}", message.subject);
        match self.notifier.send(&message).await {
            Ok(()) => {
                info!("Alert mail sent");
                Ok(())
            }
            Err(e) => {
                warn!("Could not send alert mail: {}", e);
                Err(e)
            }
        }
    }
}
