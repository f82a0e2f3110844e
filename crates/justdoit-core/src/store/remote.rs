use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use reqwest::RequestBuilder;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::error::{StoreError, StoreResult};
use crate::store::TaskStore;
use crate::task::{NewTask, Task, TaskId, TaskPatch};

pub const DEFAULT_API_URL: &str = "http://localhost:8080";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
const FALLBACK_ERROR_MESSAGE: &str = "An error occurred";

/// Tasks held by the REST API, authenticated with a bearer token.
///
/// Nothing is cached: every query goes to the server, and a failed request
/// leaves no trace on the client side.
#[derive(Debug, Clone)]
pub struct RemoteStore {
    base_url: Url,
    token: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TaskListBody {
    Bare(Vec<Task>),
    Wrapped { tasks: Vec<Task> },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TaskBody {
    Bare(Task),
    Wrapped { task: Task },
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    message: Option<String>,
}

impl RemoteStore {
    pub fn new(base_url: Url, token: impl Into<String>) -> StoreResult<Self> {
        Self::with_timeout(base_url, token, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: Url,
        token: impl Into<String>,
        timeout: Duration,
    ) -> StoreResult<Self> {
        Ok(Self {
            base_url,
            token: token.into(),
            http: build_http_client(timeout)?,
        })
    }

    fn tasks_url(&self, segments: &[&str]) -> StoreResult<Url> {
        let mut path = vec!["api", "tasks"];
        path.extend_from_slice(segments);
        endpoint(&self.base_url, &path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(&self.token)
    }

    async fn fetch_list(&self, url: Url) -> StoreResult<Vec<Task>> {
        debug!(url = %url, "fetching task list");
        let response = self.authorized(self.http.get(url)).send().await?;
        let body = read_json_response::<TaskListBody>(response)
            .await
            .map_err(|err| classify(err, None))?;
        let tasks = match body {
            TaskListBody::Bare(tasks) | TaskListBody::Wrapped { tasks } => tasks,
        };
        debug!(count = tasks.len(), "fetched tasks");
        Ok(tasks)
    }

    async fn send_for_task(&self, request: RequestBuilder, id: Option<&TaskId>) -> StoreResult<Task> {
        let response = self.authorized(request).send().await?;
        let body = read_json_response::<TaskBody>(response)
            .await
            .map_err(|err| classify(err, id))?;
        match body {
            TaskBody::Bare(task) | TaskBody::Wrapped { task } => Ok(task),
        }
    }
}

#[async_trait]
impl TaskStore for RemoteStore {
    fn kind(&self) -> &'static str {
        "remote"
    }

    #[tracing::instrument(skip(self))]
    async fn list_tasks(&self) -> StoreResult<Vec<Task>> {
        self.fetch_list(self.tasks_url(&[])?).await
    }

    #[tracing::instrument(skip(self))]
    async fn tasks_on(&self, day: NaiveDate) -> StoreResult<Vec<Task>> {
        let day = day.format("%Y-%m-%d").to_string();
        self.fetch_list(self.tasks_url(&["date", &day])?).await
    }

    #[tracing::instrument(skip(self, _now))]
    async fn today_tasks(&self, _now: NaiveDateTime) -> StoreResult<Vec<Task>> {
        self.fetch_list(self.tasks_url(&["today"])?).await
    }

    #[tracing::instrument(skip(self, _now))]
    async fn backlog_tasks(&self, _now: NaiveDateTime) -> StoreResult<Vec<Task>> {
        self.fetch_list(self.tasks_url(&["backlog"])?).await
    }

    #[tracing::instrument(skip(self, new), fields(title = %new.title))]
    async fn create_task(&mut self, new: NewTask) -> StoreResult<Task> {
        let url = self.tasks_url(&[])?;
        let task = self.send_for_task(self.http.post(url).json(&new), None).await?;
        debug!(task_id = %task.id, "task created on server");
        Ok(task)
    }

    #[tracing::instrument(skip(self, patch), fields(task_id = %id))]
    async fn update_task(&mut self, id: &TaskId, patch: TaskPatch) -> StoreResult<Task> {
        let patch = patch.normalized()?;
        let url = self.tasks_url(&[id.as_str()])?;
        self.send_for_task(self.http.put(url).json(&patch), Some(id)).await
    }

    #[tracing::instrument(skip(self), fields(task_id = %id))]
    async fn delete_task(&mut self, id: &TaskId) -> StoreResult<()> {
        let url = self.tasks_url(&[id.as_str()])?;
        let response = self.authorized(self.http.delete(url)).send().await?;
        read_text_response(response)
            .await
            .map_err(|err| classify(err, Some(id)))?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(task_id = %id))]
    async fn toggle_complete(&mut self, id: &TaskId) -> StoreResult<Task> {
        let url = self.tasks_url(&[id.as_str(), "toggle"])?;
        self.send_for_task(self.http.patch(url), Some(id)).await
    }
}

pub(crate) fn build_http_client(timeout: Duration) -> StoreResult<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("justdoit/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// Appends path segments to `base`, escaping each one.
pub(crate) fn endpoint(base: &Url, segments: &[&str]) -> StoreResult<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| StoreError::InvalidInput(format!("API url cannot be a base: {base}")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Returns the body of a successful response, or the API error it carries.
pub(crate) async fn read_text_response(response: reqwest::Response) -> StoreResult<String> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        let message = serde_json::from_str::<ApiMessage>(&body)
            .ok()
            .and_then(|parsed| parsed.message)
            .filter(|message| !message.trim().is_empty())
            .unwrap_or_else(|| FALLBACK_ERROR_MESSAGE.to_string());
        warn!(status = status.as_u16(), message = %message, "API request failed");
        return Err(StoreError::Api {
            status: status.as_u16(),
            message,
        });
    }

    Ok(body)
}

pub(crate) async fn read_json_response<T: DeserializeOwned>(
    response: reqwest::Response,
) -> StoreResult<T> {
    let body = read_text_response(response).await?;
    Ok(serde_json::from_str(&body)?)
}

/// Maps the statuses the task routes give meaning to.
fn classify(err: StoreError, id: Option<&TaskId>) -> StoreError {
    match (err, id) {
        (StoreError::Api { status: 401, .. }, _) => {
            warn!("server rejected bearer token");
            StoreError::Unauthorized
        }
        (StoreError::Api { status: 404, .. }, Some(id)) => StoreError::NotFound(id.clone()),
        (other, _) => other,
    }
}
