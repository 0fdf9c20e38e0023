//! `AIRequest` accounting and the semantic cache's data model (§4.6).
//! Cache *policy* (when to check, when to write) lives in the `ai_*`
//! handler in `flowpilot-runtime`; this module only owns the row shape and
//! the key derivation so both the handler and the store agree on it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// `SHA-256(prompt)`, hex-encoded. Paired with `model` as the cache's
/// composite lookup key.
pub fn prompt_hash(prompt: &str) -> String {
    let digest = Sha256::digest(prompt.as_bytes());
    hex::encode(digest)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticCacheEntry {
    pub prompt_hash: String,
    pub model: String,
    pub prompt: String,
    pub response: String,
    pub hit_count: u64,
    pub last_hit_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

pub const DEFAULT_CACHE_TTL_SECS: i64 = 24 * 3600;

impl SemanticCacheEntry {
    pub fn new(prompt: &str, model: impl Into<String>, response: impl Into<String>, ttl_secs: i64) -> Self {
        let now = Utc::now();
        Self {
            prompt_hash: prompt_hash(prompt),
            model: model.into(),
            prompt: prompt.to_string(),
            response: response.into(),
            hit_count: 0,
            last_hit_at: None,
            created_at: now,
            expires_at: now + chrono::Duration::seconds(ttl_secs),
        }
    }

    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }

    /// Atomic (from the caller's perspective) hit accounting: increments
    /// `hit_count` and updates `last_hit_at`. Monotone non-decreasing.
    pub fn record_hit(&mut self, at: DateTime<Utc>) {
        self.hit_count += 1;
        self.last_hit_at = Some(at);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiRequest {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub step_id: Option<Uuid>,
    pub provider: String,
    pub model: String,
    pub prompt: String,
    pub response: Option<String>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
    pub duration_ms: i64,
    pub success: bool,
    pub error: Option<String>,
    pub cached: bool,
    pub created_at: DateTime<Utc>,
}

impl AiRequest {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        execution_id: Uuid,
        step_id: Option<Uuid>,
        provider: impl Into<String>,
        model: impl Into<String>,
        prompt: impl Into<String>,
        response: Option<String>,
        input_tokens: u64,
        output_tokens: u64,
        cost: f64,
        duration_ms: i64,
        success: bool,
        error: Option<String>,
        cached: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            execution_id,
            step_id,
            provider: provider.into(),
            model: model.into(),
            prompt: prompt.into(),
            response,
            input_tokens,
            output_tokens,
            cost,
            duration_ms,
            success,
            error,
            cached,
            created_at: Utc::now(),
        }
    }

    /// `total_tokens` is always computed, never stored raw.
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_prompt_same_hash() {
        assert_eq!(prompt_hash("hello"), prompt_hash("hello"));
        assert_ne!(prompt_hash("hello"), prompt_hash("world"));
    }

    #[test]
    fn cache_hit_accounting_monotone() {
        let mut entry = SemanticCacheEntry::new("hello", "claude-3", "hi there", DEFAULT_CACHE_TTL_SECS);
        assert_eq!(entry.hit_count, 0);
        entry.record_hit(Utc::now());
        entry.record_hit(Utc::now());
        assert_eq!(entry.hit_count, 2);
    }

    #[test]
    fn expired_entry_is_invalid() {
        let entry = SemanticCacheEntry::new("hello", "claude-3", "hi", -1);
        assert!(!entry.is_valid(Utc::now()));
    }

    #[test]
    fn total_tokens_is_sum() {
        let req = AiRequest::new(
            Uuid::new_v4(), None, "anthropic", "claude-3", "p", Some("r".into()), 10, 5, 0.01, 100, true, None, false,
        );
        assert_eq!(req.total_tokens(), 15);
    }
}
