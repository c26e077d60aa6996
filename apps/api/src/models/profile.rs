use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProfileRow {
    pub id: Uuid,
    pub linkedin_about: Option<String>,
    pub github_url: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Fields the admin form hands over when saving the profile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub linkedin_about: String,
    #[serde(default)]
    pub github_url: String,
}
