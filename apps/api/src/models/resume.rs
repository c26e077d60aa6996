use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One uploaded resume. At most one row is `active` after an upload completes.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ResumeRow {
    pub id: Uuid,
    /// Object key inside the private resume bucket.
    pub file_url: Option<String>,
    pub active: bool,
    pub uploaded_at: DateTime<Utc>,
}
