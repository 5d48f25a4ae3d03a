//! Email through an HTTP mail relay
//!
//! The relay accepts a multipart form (`from`, `to`, `subject`, `text`,
//! optional `attachment`) authenticated with HTTP basic auth `api:<key>`,
//! the Mailgun messages API shape.

use super::{NotificationChannel, OutgoingNotification, EMAIL_SUBJECT};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use tracing::{debug, warn};
use vigil_common::config::EmailConfig;
use vigil_common::db::models::Channel;

pub struct MailRelayChannel {
    client: reqwest::Client,
    relay_url: String,
    api_key: String,
    from: String,
    recipients: Vec<String>,
}

impl MailRelayChannel {
    /// Build from configuration; `None` when the transport is not configured
    pub fn from_config(config: &EmailConfig, client: reqwest::Client) -> Option<Self> {
        let (Some(relay_url), Some(api_key), Some(from)) =
            (&config.relay_url, &config.api_key, &config.from)
        else {
            warn!("Email transport not configured (relay_url, api_key and from are required)");
            return None;
        };
        if config.recipients.is_empty() {
            warn!("Email transport has no recipients configured");
            return None;
        }

        Some(Self {
            client,
            relay_url: relay_url.clone(),
            api_key: api_key.clone(),
            from: from.clone(),
            recipients: config.recipients.clone(),
        })
    }

    async fn build_form(&self, notification: &OutgoingNotification) -> Result<Form> {
        let mut form = Form::new()
            .text("from", self.from.clone())
            .text("to", self.recipients.join(","))
            .text("subject", EMAIL_SUBJECT)
            .text("text", notification.email_body());

        if let Some(path) = &notification.attachment {
            let bytes = tokio::fs::read(path).await?;
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "clip.mp4".to_string());
            let part = Part::bytes(bytes)
                .file_name(file_name)
                .mime_str("video/mp4")
                .map_err(|e| Error::Notification(format!("attachment: {}", e)))?;
            form = form.part("attachment", part);
        }

        Ok(form)
    }
}

#[async_trait]
impl NotificationChannel for MailRelayChannel {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    fn recipient(&self) -> String {
        self.recipients.join(", ")
    }

    async fn send(&self, notification: &OutgoingNotification) -> Result<()> {
        let form = self.build_form(notification).await?;

        let response = self
            .client
            .post(&self.relay_url)
            .basic_auth("api", Some(&self.api_key))
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Notification(format!("mail relay unreachable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Notification(format!(
                "mail relay returned {}: {}",
                status, body
            )));
        }

        debug!("Email for alert {} accepted by relay", notification.alert_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EmailConfig {
        EmailConfig {
            relay_url: Some("https://mail.example.com/v3/example.com/messages".to_string()),
            api_key: Some("key".to_string()),
            from: Some("vigil@example.com".to_string()),
            recipients: vec!["a@example.com".to_string(), "b@example.com".to_string()],
        }
    }

    #[test]
    fn test_configured_transport() {
        let channel = MailRelayChannel::from_config(&config(), reqwest::Client::new()).unwrap();
        assert_eq!(channel.channel(), Channel::Email);
        assert_eq!(channel.recipient(), "a@example.com, b@example.com");
    }

    #[test]
    fn test_incomplete_configuration_is_none() {
        let mut missing_key = config();
        missing_key.api_key = None;
        assert!(MailRelayChannel::from_config(&missing_key, reqwest::Client::new()).is_none());

        let mut no_recipients = config();
        no_recipients.recipients.clear();
        assert!(MailRelayChannel::from_config(&no_recipients, reqwest::Client::new()).is_none());
    }
}
