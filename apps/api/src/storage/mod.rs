//! Backing store for resumes and the profile record.
//!
//! `AppState` holds an `Arc<dyn PortfolioStore>`; the production implementation
//! is [`PgS3Store`] (PostgreSQL rows + a private S3 bucket). Every method
//! reports failures as a tagged [`Failure`] so callers can normalize them.

use async_trait::async_trait;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use serde_json::json;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::models::profile::{ProfileRow, ProfileUpdate};
use crate::models::resume::ResumeRow;
use crate::normalizer::Failure;

#[async_trait]
pub trait PortfolioStore: Send + Sync {
    /// Most recently uploaded active resume, if any.
    async fn latest_resume(&self) -> Result<Option<ResumeRow>, Failure>;

    /// Binary content of a resume object in the private bucket.
    async fn download_resume(&self, path: &str) -> Result<Bytes, Failure>;

    /// The profile record shown to visitors (at most one row).
    async fn fetch_profile(&self) -> Result<Option<ProfileRow>, Failure>;

    async fn fetch_profile_by_id(&self, id: Uuid) -> Result<Option<ProfileRow>, Failure>;

    async fn upsert_profile(&self, id: Uuid, update: &ProfileUpdate)
        -> Result<ProfileRow, Failure>;

    async fn upload_resume_object(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), Failure>;

    /// Deactivates every active resume and records `file_url` as the active one.
    async fn activate_resume(&self, file_url: &str) -> Result<ResumeRow, Failure>;
}

pub struct PgS3Store {
    pool: PgPool,
    s3: aws_sdk_s3::Client,
    bucket: String,
}

impl PgS3Store {
    pub fn new(pool: PgPool, s3: aws_sdk_s3::Client, bucket: String) -> Self {
        Self { pool, s3, bucket }
    }
}

#[async_trait]
impl PortfolioStore for PgS3Store {
    async fn latest_resume(&self) -> Result<Option<ResumeRow>, Failure> {
        Ok(sqlx::query_as::<_, ResumeRow>(
            "SELECT * FROM resume_store WHERE active = true ORDER BY uploaded_at DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn download_resume(&self, path: &str) -> Result<Bytes, Failure> {
        let object = self
            .s3
            .get_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .map_err(s3_failure)?;

        let body = object
            .body
            .collect()
            .await
            .map_err(|e| Failure::message(format!("Failed to read resume download: {e}")))?;
        Ok(body.into_bytes())
    }

    async fn fetch_profile(&self) -> Result<Option<ProfileRow>, Failure> {
        Ok(sqlx::query_as::<_, ProfileRow>(
            "SELECT * FROM profiles ORDER BY updated_at DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn fetch_profile_by_id(&self, id: Uuid) -> Result<Option<ProfileRow>, Failure> {
        Ok(
            sqlx::query_as::<_, ProfileRow>("SELECT * FROM profiles WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn upsert_profile(
        &self,
        id: Uuid,
        update: &ProfileUpdate,
    ) -> Result<ProfileRow, Failure> {
        let row = sqlx::query_as::<_, ProfileRow>(
            r#"
            INSERT INTO profiles (id, linkedin_about, github_url, updated_at)
            VALUES ($1, $2, $3, now())
            ON CONFLICT (id) DO UPDATE
                SET linkedin_about = EXCLUDED.linkedin_about,
                    github_url = EXCLUDED.github_url,
                    updated_at = now()
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&update.linkedin_about)
        .bind(&update.github_url)
        .fetch_one(&self.pool)
        .await?;

        info!("Saved profile {id}");
        Ok(row)
    }

    async fn upload_resume_object(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), Failure> {
        self.s3
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .map_err(s3_failure)?;

        info!("Uploaded resume to s3://{}/{}", self.bucket, key);
        Ok(())
    }

    async fn activate_resume(&self, file_url: &str) -> Result<ResumeRow, Failure> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE resume_store SET active = false WHERE active = true")
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query_as::<_, ResumeRow>(
            r#"
            INSERT INTO resume_store (id, file_url, active, uploaded_at)
            VALUES ($1, $2, true, now())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(file_url)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        info!("Activated resume {} ({file_url})", row.id);
        Ok(row)
    }
}

/// S3 errors without a message (typically access denied on a private object)
/// become opaque so the normalizer substitutes its login hint.
fn s3_failure<E, R>(err: SdkError<E, R>) -> Failure
where
    E: ProvideErrorMetadata,
{
    match err.message() {
        Some(message) if !message.trim().is_empty() => Failure::message(message),
        _ => Failure::Opaque(json!({ "code": err.code() })),
    }
}
