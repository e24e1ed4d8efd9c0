//! Web-push fanout. Payloads are encrypted per RFC 8291 (`aes128gcm`) and
//! signed with an RFC 8292 VAPID JWT via the web-push crate. Disabled unless
//! both VAPID keys are configured; gone endpoints (404/410) are dropped from
//! the subscription table.

use serde_json::json;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};
use web_push::{
    ContentEncoding, IsahcWebPushClient, SubscriptionInfo, VapidSignatureBuilder, WebPushClient,
    WebPushError, WebPushMessageBuilder, URL_SAFE_NO_PAD,
};

use crate::config::{Config, PUSH_BODY_MAX, PUSH_TITLE_MAX};
use crate::db::models::PushSubscriptionRow;
use crate::db::push as push_db;
use crate::error::Result;

const PUSH_TTL_SECS: u32 = 86_400;

pub struct PushClient {
    /// None when VAPID keys are missing — every send is a no-op.
    client: Option<IsahcWebPushClient>,
    private_key: String,
    claim_email: String,
}

impl PushClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = if cfg.push_enabled() {
            Some(IsahcWebPushClient::new()?)
        } else {
            debug!("VAPID keys not configured — push fanout disabled");
            None
        };
        Ok(Self {
            client,
            private_key: cfg.vapid_private_key.clone(),
            claim_email: cfg.vapid_claim_email.clone(),
        })
    }

    /// Encrypt and POST the payload to every subscription of the tenant.
    /// Delivery failures never propagate into the crawl pipeline.
    pub async fn send_to_tenant(
        &self,
        pool: &SqlitePool,
        tenant_id: i64,
        title: &str,
        body: &str,
        data: serde_json::Value,
    ) {
        let Some(client) = self.client.as_ref() else {
            return;
        };

        let subscriptions = match push_db::subscriptions_for_tenant(pool, tenant_id).await {
            Ok(s) => s,
            Err(e) => {
                warn!(tenant_id, "push subscription lookup failed: {e}");
                return;
            }
        };
        if subscriptions.is_empty() {
            return;
        }

        let payload = json!({
            "title": truncate_chars(title, PUSH_TITLE_MAX),
            "body": truncate_chars(body, PUSH_BODY_MAX),
            "data": data,
        })
        .to_string();

        for sub in subscriptions {
            match self.deliver(client, &sub, payload.as_bytes()).await {
                Ok(()) => debug!(tenant_id, "push delivered"),
                Err(WebPushError::EndpointNotValid | WebPushError::EndpointNotFound) => {
                    info!(tenant_id, "push subscription gone, deleting");
                    if let Err(e) = push_db::delete_subscription(pool, &sub.endpoint).await {
                        warn!("failed to delete stale subscription: {e}");
                    }
                }
                Err(e) => warn!(tenant_id, "push delivery failed: {e}"),
            }
        }
    }

    async fn deliver(
        &self,
        client: &IsahcWebPushClient,
        sub: &PushSubscriptionRow,
        payload: &[u8],
    ) -> std::result::Result<(), WebPushError> {
        let info = SubscriptionInfo::new(&sub.endpoint, &sub.p256dh, &sub.auth);

        let mut signature =
            VapidSignatureBuilder::from_base64(&self.private_key, URL_SAFE_NO_PAD, &info)?;
        signature.add_claim("sub", format!("mailto:{}", self.claim_email));

        let mut builder = WebPushMessageBuilder::new(&info);
        builder.set_ttl(PUSH_TTL_SECS);
        builder.set_payload(ContentEncoding::Aes128Gcm, payload);
        builder.set_vapid_signature(signature.build()?);

        client.send(builder.build()?).await
    }
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_char_boundaries() {
        let korean = "가나다라마바사아자차";
        assert_eq!(truncate_chars(korean, 3), "가나다");
        assert_eq!(truncate_chars("short", 100), "short");
    }
}
