//! In-memory fakes of the external seams, shared by unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::StreamExt;
use uuid::Uuid;

use crate::llm_client::{
    ChatBackend, Conversation, ConversationConfig, Fragment, FragmentStream, LlmError,
};
use crate::models::profile::{ProfileRow, ProfileUpdate};
use crate::models::resume::ResumeRow;
use crate::normalizer::Failure;
use crate::storage::PortfolioStore;

pub fn resume_row(file_url: Option<&str>) -> ResumeRow {
    ResumeRow {
        id: Uuid::new_v4(),
        file_url: file_url.map(String::from),
        active: true,
        uploaded_at: Utc::now(),
    }
}

fn profile_row(id: Uuid, update: &ProfileUpdate) -> ProfileRow {
    ProfileRow {
        id,
        linkedin_about: Some(update.linkedin_about.clone()),
        github_url: Some(update.github_url.clone()),
        updated_at: Utc::now(),
    }
}

#[derive(Default)]
pub struct FakeStore {
    resume: Mutex<Option<ResumeRow>>,
    files: Mutex<HashMap<String, Bytes>>,
    profiles: Mutex<HashMap<Uuid, ProfileRow>>,
    resume_failure: Option<Failure>,
    download_failure: Option<Failure>,
    profile_failure: Option<Failure>,
    activated: Mutex<Vec<String>>,
}

impl FakeStore {
    pub fn with_resume(path: &str, content: &str) -> Self {
        let store = Self::default().with_resume_row(resume_row(Some(path)));
        store.put_file(path, Bytes::from(content.to_string()));
        store
    }

    pub fn with_resume_row(self, row: ResumeRow) -> Self {
        *self.resume.lock().unwrap() = Some(row);
        self
    }

    pub fn with_profile(self, linkedin_about: &str, github_url: &str) -> Self {
        let update = ProfileUpdate {
            linkedin_about: linkedin_about.to_string(),
            github_url: github_url.to_string(),
        };
        let id = Uuid::new_v4();
        self.profiles
            .lock()
            .unwrap()
            .insert(id, profile_row(id, &update));
        self
    }

    pub fn failing_latest(mut self, failure: Failure) -> Self {
        self.resume_failure = Some(failure);
        self
    }

    pub fn failing_download(mut self, failure: Failure) -> Self {
        self.download_failure = Some(failure);
        self
    }

    pub fn failing_profile(mut self, failure: Failure) -> Self {
        self.profile_failure = Some(failure);
        self
    }

    pub fn activated(&self) -> Vec<String> {
        self.activated.lock().unwrap().clone()
    }

    pub fn has_file(&self, key: &str) -> bool {
        self.files.lock().unwrap().contains_key(key)
    }

    fn put_file(&self, key: &str, body: Bytes) {
        self.files.lock().unwrap().insert(key.to_string(), body);
    }
}

#[async_trait]
impl PortfolioStore for FakeStore {
    async fn latest_resume(&self) -> Result<Option<ResumeRow>, Failure> {
        if let Some(failure) = &self.resume_failure {
            return Err(failure.clone());
        }
        Ok(self.resume.lock().unwrap().clone())
    }

    async fn download_resume(&self, path: &str) -> Result<Bytes, Failure> {
        if let Some(failure) = &self.download_failure {
            return Err(failure.clone());
        }
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| Failure::message("Object not found"))
    }

    async fn fetch_profile(&self) -> Result<Option<ProfileRow>, Failure> {
        if let Some(failure) = &self.profile_failure {
            return Err(failure.clone());
        }
        Ok(self.profiles.lock().unwrap().values().next().cloned())
    }

    async fn fetch_profile_by_id(&self, id: Uuid) -> Result<Option<ProfileRow>, Failure> {
        Ok(self.profiles.lock().unwrap().get(&id).cloned())
    }

    async fn upsert_profile(
        &self,
        id: Uuid,
        update: &ProfileUpdate,
    ) -> Result<ProfileRow, Failure> {
        let row = profile_row(id, update);
        self.profiles.lock().unwrap().insert(id, row.clone());
        Ok(row)
    }

    async fn upload_resume_object(
        &self,
        key: &str,
        body: Bytes,
        _content_type: &str,
    ) -> Result<(), Failure> {
        self.put_file(key, body);
        Ok(())
    }

    async fn activate_resume(&self, file_url: &str) -> Result<ResumeRow, Failure> {
        let row = resume_row(Some(file_url));
        *self.resume.lock().unwrap() = Some(row.clone());
        self.activated.lock().unwrap().push(file_url.to_string());
        Ok(row)
    }
}

/// One scripted backend event.
#[derive(Debug, Clone, Copy)]
pub enum ScriptStep {
    Text(&'static str),
    /// A fragment carrying no text.
    Empty,
    /// An API failure with a status and raw body.
    Fail(u16, &'static str),
}

/// A backend that replays the same script for every message.
#[derive(Default)]
pub struct ScriptedBackend {
    script: Vec<ScriptStep>,
    open_error: Mutex<Option<LlmError>>,
    opened: Mutex<Vec<ConversationConfig>>,
    sent: Arc<Mutex<Vec<String>>>,
}

impl ScriptedBackend {
    pub fn new(script: Vec<ScriptStep>) -> Self {
        Self {
            script,
            ..Default::default()
        }
    }

    pub fn failing_open(error: LlmError) -> Self {
        Self {
            open_error: Mutex::new(Some(error)),
            ..Default::default()
        }
    }

    pub fn opened_configs(&self) -> Vec<ConversationConfig> {
        self.opened.lock().unwrap().clone()
    }

    pub fn sent_messages(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn open_conversation(
        &self,
        config: ConversationConfig,
    ) -> Result<Arc<dyn Conversation>, LlmError> {
        if let Some(error) = self.open_error.lock().unwrap().take() {
            return Err(error);
        }
        self.opened.lock().unwrap().push(config);
        Ok(Arc::new(ScriptedConversation {
            script: self.script.clone(),
            sent: Arc::clone(&self.sent),
        }))
    }
}

struct ScriptedConversation {
    script: Vec<ScriptStep>,
    sent: Arc<Mutex<Vec<String>>>,
}

impl Conversation for ScriptedConversation {
    fn send_stream(&self, message: String) -> FragmentStream {
        self.sent.lock().unwrap().push(message);
        let items: Vec<Result<Fragment, LlmError>> = self
            .script
            .iter()
            .map(|step| match *step {
                ScriptStep::Text(text) => Ok(Fragment::text(text)),
                ScriptStep::Empty => Ok(Fragment::default()),
                ScriptStep::Fail(status, body) => Err(LlmError::Api {
                    status,
                    message: body.to_string(),
                }),
            })
            .collect();
        futures::stream::iter(items).boxed()
    }
}

/// Drains a fragment stream into its concatenated text.
pub async fn collect_text(mut stream: FragmentStream) -> Result<String, LlmError> {
    let mut text = String::new();
    while let Some(fragment) = stream.next().await {
        if let Some(part) = fragment?.text {
            text.push_str(&part);
        }
    }
    Ok(text)
}
