//! Inbound webhook trigger resolution (§4.3): matches the `{id}/{token}`
//! path segment of `POST /webhooks/workflows/{id}/{token}` to a
//! `WorkflowTrigger`, optionally verifying an HMAC-SHA256 request signature
//! against the trigger's `webhook_secret` the way an inbound GitHub hook is
//! verified, but with a constant-time comparison rather than a plain `==`.

use flowpilot_core::{AuditEventKind, AuditLog, AuditOutcome, Error, Result, WorkflowStore, WorkflowTrigger};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::dispatcher::TriggerDispatcher;

type HmacSha256 = Hmac<Sha256>;

/// Resolves and validates the `(workflow_id, token)` pair from a webhook
/// URL before the dispatcher is allowed to fire it.
pub struct WebhookLookup<'a> {
    workflow_store: &'a dyn WorkflowStore,
}

impl<'a> WebhookLookup<'a> {
    pub fn new(workflow_store: &'a dyn WorkflowStore) -> Self {
        Self { workflow_store }
    }

    /// Finds the active webhook trigger for `workflow_id` whose
    /// `webhook_path` equals `"{workflow_id}/{token}"`, constant-time
    /// comparing `token` against the stored path suffix. Returns
    /// `NotFound` for an unknown path and `Validation` for a disabled or
    /// non-webhook trigger, so the HTTP layer can tell "404" from "400"
    /// without inspecting trigger internals.
    pub async fn resolve(&self, workflow_id: Uuid, token: &str) -> Result<WorkflowTrigger> {
        let path = webhook_path(workflow_id, token);
        let trigger = self.workflow_store.find_trigger_by_webhook_path(&path).await?;
        if trigger.kind != flowpilot_core::TriggerKind::Webhook {
            return Err(Error::validation("resolved trigger is not a webhook trigger"));
        }
        if !trigger.is_active {
            return Err(Error::validation("webhook trigger is disabled"));
        }
        Ok(trigger)
    }
}

/// Composes the canonical webhook path stored on a `WorkflowTrigger` at
/// creation time and looked up again on every inbound request.
pub fn webhook_path(workflow_id: Uuid, token: &str) -> String {
    format!("{workflow_id}/{token}")
}

/// Verifies an `X-Signature: sha256=<hex>`-style header against `payload`
/// using `secret`, constant-time comparing the decoded digest rather than
/// the hex string so a timing side-channel can't leak byte-by-byte.
pub fn verify_webhook_signature(secret: &str, payload: &[u8], signature_header: &str) -> bool {
    let Some(provided_hex) = signature_header.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(provided) = hex::decode(provided_hex) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    let computed = mac.finalize().into_bytes();
    computed.as_slice().ct_eq(&provided).into()
}

/// Resolves, (optionally) signature-verifies, and fires an inbound webhook,
/// auditing rejections under [`AuditEventKind::WebhookRejected`]. Returns
/// the submitted execution id on success.
pub async fn handle_webhook(
    dispatcher: &TriggerDispatcher,
    workflow_id: Uuid,
    token: &str,
    signature_header: Option<&str>,
    payload: serde_json::Value,
    raw_body: &[u8],
) -> Result<Uuid> {
    let lookup = WebhookLookup::new(dispatcher.workflow_store().as_ref());
    let trigger = match lookup.resolve(workflow_id, token).await {
        Ok(t) => t,
        Err(err) => {
            dispatcher
                .record_rejection(
                    AuditLog::new(AuditEventKind::WebhookRejected, AuditOutcome::Failure)
                        .with_details(serde_json::json!({"workflow_id": workflow_id, "reason": err.to_string()})),
                )
                .await;
            return Err(err);
        }
    };

    if let Some(secret) = trigger.webhook_secret.as_deref() {
        let header = signature_header.unwrap_or("");
        if !verify_webhook_signature(secret, raw_body, header) {
            dispatcher
                .record_rejection(
                    AuditLog::new(AuditEventKind::WebhookRejected, AuditOutcome::Failure)
                        .with_details(serde_json::json!({"trigger_id": trigger.id, "reason": "signature mismatch"})),
                )
                .await;
            return Err(Error::authentication("webhook signature verification failed"));
        }
    }

    let execution = dispatcher.fire_trigger(trigger, payload).await?;
    Ok(execution.id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_round_trips() {
        let secret = "s3cret";
        let body = br#"{"hello":"world"}"#;
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        let digest = hex::encode(mac.finalize().into_bytes());
        let header = format!("sha256={digest}");
        assert!(verify_webhook_signature(secret, body, &header));
    }

    #[test]
    fn wrong_secret_fails() {
        let body = br#"{"hello":"world"}"#;
        let mut mac = HmacSha256::new_from_slice(b"right-secret").unwrap();
        mac.update(body);
        let digest = hex::encode(mac.finalize().into_bytes());
        let header = format!("sha256={digest}");
        assert!(!verify_webhook_signature("wrong-secret", body, &header));
    }

    #[test]
    fn missing_prefix_fails() {
        assert!(!verify_webhook_signature("secret", b"body", "deadbeef"));
    }

    #[test]
    fn webhook_path_is_workflow_scoped() {
        let id = Uuid::new_v4();
        assert_eq!(webhook_path(id, "tok"), format!("{id}/tok"));
    }
}
