//! SMS through the Twilio Messages REST endpoint

use super::{NotificationChannel, OutgoingNotification};
use crate::error::{Error, Result};
use async_trait::async_trait;
use tracing::{debug, warn};
use vigil_common::config::SmsConfig;
use vigil_common::db::models::Channel;

pub const TWILIO_API_BASE: &str = "https://api.twilio.com/2010-04-01";

pub struct TwilioSmsChannel {
    client: reqwest::Client,
    messages_url: String,
    account_sid: String,
    auth_token: String,
    from_number: String,
    to_number: String,
}

impl TwilioSmsChannel {
    /// Build from configuration; `None` when the transport is not configured
    pub fn from_config(config: &SmsConfig, client: reqwest::Client) -> Option<Self> {
        let (Some(account_sid), Some(auth_token), Some(from_number), Some(to_number)) = (
            &config.account_sid,
            &config.auth_token,
            &config.from_number,
            &config.to_number,
        ) else {
            warn!("SMS transport not configured (account_sid, auth_token, from_number and to_number are required)");
            return None;
        };

        Some(Self {
            client,
            messages_url: messages_url(TWILIO_API_BASE, account_sid),
            account_sid: account_sid.clone(),
            auth_token: auth_token.clone(),
            from_number: from_number.clone(),
            to_number: to_number.clone(),
        })
    }
}

fn messages_url(base: &str, account_sid: &str) -> String {
    format!("{}/Accounts/{}/Messages.json", base.trim_end_matches('/'), account_sid)
}

#[async_trait]
impl NotificationChannel for TwilioSmsChannel {
    fn channel(&self) -> Channel {
        Channel::Sms
    }

    fn recipient(&self) -> String {
        self.to_number.clone()
    }

    async fn send(&self, notification: &OutgoingNotification) -> Result<()> {
        let body = notification.sms_body();
        let params = [
            ("Body", body.as_str()),
            ("From", self.from_number.as_str()),
            ("To", self.to_number.as_str()),
        ];

        let response = self
            .client
            .post(&self.messages_url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&params)
            .send()
            .await
            .map_err(|e| Error::Notification(format!("SMS gateway unreachable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::Notification(format!(
                "SMS gateway returned {}: {}",
                status, detail
            )));
        }

        debug!("SMS for alert {} accepted", notification.alert_id);
        Ok(())
    }
}
