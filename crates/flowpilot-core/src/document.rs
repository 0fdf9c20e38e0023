//! `Document` and its children. Non-goal per §1 — OCR/embedding behavior
//! lives behind the external AI Service collaborator, not in this crate.
//! Only the type shape is carried, for the `documents:create` quota
//! classification path and so `AuditStore`/`UsageStore` have something
//! concrete to reference by id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Uploading,
    Processing,
    Ready,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub storage_path: String,
    pub size_bytes: u64,
    pub checksum_sha256: String,
    pub mime_type: String,
    pub status: DocumentStatus,
    pub page_count: u32,
    pub uploaded_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentPage {
    pub id: Uuid,
    pub document_id: Uuid,
    pub page_number: u32,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentExtraction {
    pub id: Uuid,
    pub document_id: Uuid,
    pub extraction_type: String,
    pub data: serde_json::Value,
}
