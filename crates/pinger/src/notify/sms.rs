use async_trait::async_trait;

use super::{DELIVERY_TIMEOUT, Subscriber, Transport};
use crate::config::TwilioConfig;
use crate::error::{ConfigurationError, DeliveryError};

/// SMS through the Twilio messaging REST API. Only the body is sent.
pub struct SmsTransport {
    client: reqwest::Client,
    endpoint: String,
    account_sid: String,
    auth_token: String,
    messaging_service_sid: String,
}

impl SmsTransport {
    pub fn new(config: &TwilioConfig) -> Result<Self, ConfigurationError> {
        let client = reqwest::Client::builder().timeout(DELIVERY_TIMEOUT).build().map_err(|e| {
            ConfigurationError::InvalidAddress {
                address: config.api_base.clone(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self::with_client(config, client))
    }

    pub fn with_client(config: &TwilioConfig, client: reqwest::Client) -> Self {
        let endpoint = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            config.api_base.trim_end_matches('/'),
            config.account_sid
        );
        Self {
            client,
            endpoint,
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
            messaging_service_sid: config.messaging_service_sid.clone(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// E.164: a '+' followed by up to 15 digits.
fn is_phone_number(destination: &str) -> bool {
    match destination.strip_prefix('+') {
        Some(digits) => {
            (2..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

#[async_trait]
impl Transport for SmsTransport {
    fn validate(&self, subscriber: &Subscriber) -> Result<(), ConfigurationError> {
        if is_phone_number(&subscriber.destination) {
            Ok(())
        } else {
            Err(ConfigurationError::InvalidAddress {
                address: subscriber.destination.clone(),
                reason: "expected an E.164 phone number such as +15550100".into(),
            })
        }
    }

    async fn deliver(
        &self,
        subscriber: &Subscriber,
        _subject: &str,
        body: &str,
    ) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[
                ("To", subscriber.destination.as_str()),
                ("MessagingServiceSid", self.messaging_service_sid.as_str()),
                ("Body", body),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected { status: status.as_u16(), body });
        }

        tracing::debug!(destination = %subscriber.destination, "SMS accepted by provider");
        Ok(())
    }
}
