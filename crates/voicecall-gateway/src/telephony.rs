//! Outbound-dial adapter (§4.12 step 3, §6 Telephony). Places a call via the
//! configured telephony provider's REST API and hands back the call SID the
//! provider assigned; answer/no-answer/busy outcomes arrive later on
//! `/voice/status`, not from this call.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use voicecall_core::config::TelephonyConfig;
use voicecall_core::types::{CallSid, Reminder, TenantId};
use voicecall_scheduler::OutboundDialer;

use crate::tenants::TenantStore;

pub struct TelephonyClient {
    client: reqwest::Client,
    config: TelephonyConfig,
    tenants: Arc<TenantStore>,
    base_url: String,
    /// Public URL the provider should hit for `/voice/answer` once the call
    /// connects — normally `{public_base_url}/voice/answer`.
    answer_url: String,
    status_url: String,
}

impl TelephonyClient {
    pub fn new(config: TelephonyConfig, tenants: Arc<TenantStore>, public_base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: "https://api.telephony.invalid".to_string(),
            answer_url: format!("{public_base_url}/voice/answer"),
            status_url: format!("{public_base_url}/voice/status"),
            config,
            tenants,
        }
    }
}

#[async_trait]
impl OutboundDialer for TelephonyClient {
    async fn dial(&self, tenant_id: &TenantId, reminder: &Reminder) -> Result<CallSid, String> {
        let tenant = self
            .tenants
            .get(tenant_id.as_str())
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("unknown tenant {}", tenant_id.as_str()))?;

        let url = format!(
            "{}/2010-04-01/Accounts/{}/Calls.json",
            self.base_url, self.config.account_id
        );

        let resp = self
            .client
            .post(&url)
            .basic_auth(&self.config.account_id, Some(&self.config.auth_token))
            .form(&[
                ("From", self.config.number.as_str()),
                ("To", tenant.phone.as_str()),
                ("Url", self.answer_url.as_str()),
                ("StatusCallback", self.status_url.as_str()),
                ("StatusCallbackMethod", "POST"),
            ])
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            warn!(%status, reminder_id = %reminder.id, "outbound dial rejected by telephony provider");
            return Err(format!("dial failed ({status}): {body}"));
        }

        #[derive(serde::Deserialize)]
        struct DialResponse {
            sid: String,
        }
        let parsed: DialResponse = resp.json().await.map_err(|e| e.to_string())?;
        Ok(CallSid(parsed.sid))
    }
}
