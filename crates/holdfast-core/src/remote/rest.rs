//! PostgREST-style HTTP adapter for the task store, the blob store and the
//! punishment transform.
//!
//! Endpoints, relative to `base_url`:
//!
//! - `GET    rest/v1/<tasks>?select=...`       task list with today's completions embedded
//! - `POST   rest/v1/<completions>`            insert a completion for today
//! - `DELETE rest/v1/<completions>?task_id=..` delete today's completions
//! - `POST   storage/v1/object/<bucket>/<name>` store a captured frame
//! - `POST   functions/v1/<transform>`          generate the punishment image

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;

use super::{BlobStore, HabitStore, ImageTransform, StoreReceipt};
use crate::error::RemoteError;
use crate::task::{CompletionRecord, Task, TaskId};

/// Remote store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_tasks_table")]
    pub tasks_table: String,
    #[serde(default = "default_completions_table")]
    pub completions_table: String,
    /// Edge function that turns an uploaded photo into a punishment image.
    #[serde(default)]
    pub transform_function: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_tasks_table() -> String {
    "habits".into()
}
fn default_completions_table() -> String {
    "completions".into()
}
fn default_timeout_secs() -> u64 {
    10
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            tasks_table: default_tasks_table(),
            completions_table: default_completions_table(),
            transform_function: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TaskRow {
    id: String,
    title: String,
    #[serde(default)]
    streak: u32,
    #[serde(default)]
    completions: Vec<CompletionDateRow>,
}

#[derive(Debug, Deserialize)]
struct CompletionDateRow {
    completed_on: NaiveDate,
}

#[derive(Debug, Deserialize)]
struct CompletionRow {
    id: serde_json::Value,
    task_id: String,
    completed_on: NaiveDate,
}

#[derive(Debug, Deserialize)]
struct TransformResponse {
    url: String,
}

/// HTTP client for a Supabase-compatible backend.
pub struct RestClient {
    http: Client,
    base: Url,
    api_key: String,
    tasks_table: String,
    completions_table: String,
    transform_function: Option<String>,
    today: fn() -> NaiveDate,
}

fn local_today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

impl RestClient {
    pub fn new(config: &RemoteConfig) -> Result<Self, RemoteError> {
        if config.base_url.trim().is_empty() {
            return Err(RemoteError::NotConfigured("remote.base_url is empty".into()));
        }
        let mut base = Url::parse(config.base_url.trim())?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;

        Ok(Self {
            http,
            base,
            api_key: config.api_key.clone(),
            tasks_table: config.tasks_table.clone(),
            completions_table: config.completions_table.clone(),
            transform_function: config.transform_function.clone(),
            today: local_today,
        })
    }

    /// Override how "today" is determined (tests, fixed time zones).
    pub fn with_today(mut self, today: fn() -> NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn has_transform(&self) -> bool {
        self.transform_function.is_some()
    }

    fn endpoint(&self, path: &str) -> Result<Url, RemoteError> {
        Ok(self.base.join(path)?)
    }

    fn authorized(&self, rb: RequestBuilder) -> RequestBuilder {
        if self.api_key.is_empty() {
            return rb;
        }
        rb.header("apikey", &self.api_key).bearer_auth(&self.api_key)
    }

    async fn checked(resp: Response) -> Result<Response, RemoteError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(RemoteError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl HabitStore for RestClient {
    async fn fetch_tasks(&self) -> Result<Vec<Task>, RemoteError> {
        let today = (self.today)();
        let mut url = self.endpoint(&format!("rest/v1/{}", self.tasks_table))?;
        url.query_pairs_mut()
            .append_pair("select", "id,title,streak,completions(completed_on)")
            .append_pair("completions.completed_on", &format!("eq.{today}"))
            .append_pair("order", "created_at.asc");

        let resp = self.authorized(self.http.get(url)).send().await?;
        let rows: Vec<TaskRow> = Self::checked(resp).await?.json().await?;

        Ok(rows
            .into_iter()
            .map(|row| Task {
                id: TaskId::new(row.id),
                title: row.title,
                completed_today: row.completions.iter().any(|c| c.completed_on == today),
                streak: row.streak,
            })
            .collect())
    }

    async fn insert_completion(&self, task_id: &TaskId) -> Result<CompletionRecord, RemoteError> {
        let today = (self.today)();
        let url = self.endpoint(&format!("rest/v1/{}", self.completions_table))?;
        let body = json!([{ "task_id": task_id.as_str(), "completed_on": today }]);

        let resp = self
            .authorized(self.http.post(url))
            .header("Prefer", "return=representation")
            .json(&body)
            .send()
            .await?;
        let rows: Vec<CompletionRow> = Self::checked(resp).await?.json().await?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| RemoteError::Decode("insert returned no rows".into()))?;

        let id = match row.id {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        Ok(CompletionRecord {
            id,
            task_id: TaskId::new(row.task_id),
            completed_on: row.completed_on,
        })
    }

    async fn delete_today(&self, task_id: &TaskId) -> Result<u64, RemoteError> {
        let today = (self.today)();
        let mut url = self.endpoint(&format!("rest/v1/{}", self.completions_table))?;
        url.query_pairs_mut()
            .append_pair("task_id", &format!("eq.{task_id}"))
            .append_pair("completed_on", &format!("eq.{today}"));

        let resp = self
            .authorized(self.http.delete(url))
            .header("Prefer", "return=representation")
            .send()
            .await?;
        let rows: Vec<serde_json::Value> = Self::checked(resp).await?.json().await?;
        Ok(rows.len() as u64)
    }
}

#[async_trait]
impl BlobStore for RestClient {
    async fn store(&self, bytes: &[u8], bucket: &str) -> Result<StoreReceipt, RemoteError> {
        let name = format!("panic_{}.jpg", uuid::Uuid::new_v4());
        let url = self.endpoint(&format!("storage/v1/object/{bucket}/{name}"))?;

        let resp = self
            .authorized(self.http.post(url))
            .header("Content-Type", "image/jpeg")
            .body(bytes.to_vec())
            .send()
            .await?;
        Self::checked(resp).await?;

        let public = self.endpoint(&format!("storage/v1/object/public/{bucket}/{name}"))?;
        Ok(StoreReceipt {
            success: true,
            url: Some(public.to_string()),
        })
    }
}

#[async_trait]
impl ImageTransform for RestClient {
    async fn transform(&self, image_url: &str, context: &str) -> Result<String, RemoteError> {
        let function = self
            .transform_function
            .as_deref()
            .ok_or_else(|| RemoteError::NotConfigured("remote.transform_function".into()))?;
        let url = self.endpoint(&format!("functions/v1/{function}"))?;

        let resp = self
            .authorized(self.http.post(url))
            .json(&json!({ "image_url": image_url, "context": context }))
            .send()
            .await?;
        let parsed: TransformResponse = Self::checked(resp).await?.json().await?;
        Ok(parsed.url)
    }
}
