use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::{DELIVERY_TIMEOUT, Subscriber, Transport};
use crate::config::SmtpConfig;
use crate::error::{ConfigurationError, DeliveryError};

/// SMTP delivery with mandatory STARTTLS and optional login.
pub struct EmailTransport {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailTransport {
    pub fn new(config: &SmtpConfig) -> Result<Self, ConfigurationError> {
        let from = parse_mailbox(&config.return_email)?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| ConfigurationError::InvalidAddress {
                address: config.host.clone(),
                reason: e.to_string(),
            })?
            .port(config.port)
            .timeout(Some(DELIVERY_TIMEOUT));

        if let Some(user) = config.user.as_ref().filter(|u| !u.is_empty()) {
            builder = builder.credentials(Credentials::new(user.clone(), config.pass.clone()));
        }

        Ok(Self { mailer: builder.build(), from })
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, ConfigurationError> {
    address.trim().parse::<Mailbox>().map_err(|e| ConfigurationError::InvalidAddress {
        address: address.to_string(),
        reason: e.to_string(),
    })
}

#[async_trait]
impl Transport for EmailTransport {
    fn validate(&self, subscriber: &Subscriber) -> Result<(), ConfigurationError> {
        parse_mailbox(&subscriber.destination).map(|_| ())
    }

    async fn deliver(
        &self,
        subscriber: &Subscriber,
        subject: &str,
        body: &str,
    ) -> Result<(), DeliveryError> {
        let to = subscriber
            .destination
            .parse::<Mailbox>()
            .map_err(|e| DeliveryError::Message(e.to_string()))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| DeliveryError::Message(e.to_string()))?;

        self.mailer.send(message).await?;
        Ok(())
    }
}
