use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::store::TaskStore;
use crate::task::{NewTask, Task, TaskId, TaskPatch};

pub const TASKS_FILE: &str = "tasks.json";

/// Tasks kept as one JSON array in the data directory.
///
/// The in-memory copy is replaced only after the file write succeeded.
#[derive(Debug)]
pub struct LocalStore {
    pub data_dir: PathBuf,
    pub tasks_path: PathBuf,
    tasks: Vec<Task>,
}

impl LocalStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> StoreResult<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)?;

        let tasks_path = data_dir.join(TASKS_FILE);
        let tasks: Vec<Task> = read_json(&tasks_path)?.unwrap_or_default();

        info!(
            data_dir = %data_dir.display(),
            tasks = %tasks_path.display(),
            count = tasks.len(),
            "opened local store"
        );

        Ok(Self {
            data_dir,
            tasks_path,
            tasks,
        })
    }

    fn position(&self, id: &TaskId) -> StoreResult<usize> {
        self.tasks
            .iter()
            .position(|task| &task.id == id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    fn commit(&mut self, next: Vec<Task>) -> StoreResult<()> {
        write_json_atomic(&self.tasks_path, &next)?;
        self.tasks = next;
        Ok(())
    }

    fn replace_at(&mut self, idx: usize, task: Task) -> StoreResult<Task> {
        let mut next = self.tasks.clone();
        next[idx] = task.clone();
        self.commit(next)?;
        Ok(task)
    }
}

#[async_trait]
impl TaskStore for LocalStore {
    fn kind(&self) -> &'static str {
        "local"
    }

    async fn list_tasks(&self) -> StoreResult<Vec<Task>> {
        Ok(self.tasks.clone())
    }

    #[tracing::instrument(skip(self, new), fields(title = %new.title))]
    async fn create_task(&mut self, new: NewTask) -> StoreResult<Task> {
        let mut id = TaskId::random();
        while self.tasks.iter().any(|task| task.id == id) {
            id = TaskId::random();
        }

        let task = Task::from_new(id, new);
        let mut next = self.tasks.clone();
        next.push(task.clone());
        self.commit(next)?;

        debug!(task_id = %task.id, count = self.tasks.len(), "task added");
        Ok(task)
    }

    #[tracing::instrument(skip(self, patch), fields(task_id = %id))]
    async fn update_task(&mut self, id: &TaskId, patch: TaskPatch) -> StoreResult<Task> {
        let idx = self.position(id)?;
        let updated = patch.apply_to(&self.tasks[idx])?;
        self.replace_at(idx, updated)
    }

    #[tracing::instrument(skip(self), fields(task_id = %id))]
    async fn delete_task(&mut self, id: &TaskId) -> StoreResult<()> {
        let idx = self.position(id)?;
        let mut next = self.tasks.clone();
        next.remove(idx);
        self.commit(next)?;

        debug!(count = self.tasks.len(), "task deleted");
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(task_id = %id))]
    async fn toggle_complete(&mut self, id: &TaskId) -> StoreResult<Task> {
        let idx = self.position(id)?;
        let mut toggled = self.tasks[idx].clone();
        toggled.completed = !toggled.completed;
        self.replace_at(idx, toggled)
    }
}

/// Reads a JSON document, treating a missing or empty file as absent.
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> StoreResult<Option<T>> {
    debug!(file = %path.display(), "loading json");
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };

    if raw.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(&raw)?))
}

pub(crate) fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> StoreResult<()> {
    debug!(file = %path.display(), "saving json atomically");
    replace_file(path, |temp| {
        serde_json::to_writer_pretty(&mut *temp, value)?;
        Ok(())
    })
}

pub(crate) fn write_text_atomic(path: &Path, text: &str) -> StoreResult<()> {
    replace_file(path, |temp| {
        temp.write_all(text.as_bytes())?;
        Ok(())
    })
}

/// Writes through a temp file in the same directory and renames it over
/// `path`, so readers see either the old or the new contents.
fn replace_file<F>(path: &Path, fill: F) -> StoreResult<()>
where
    F: FnOnce(&mut NamedTempFile) -> StoreResult<()>,
{
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    fill(&mut temp)?;
    writeln!(temp)?;
    temp.flush()?;

    temp.persist(path).map_err(|err| StoreError::Io(err.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime};
    use tempfile::tempdir;

    use super::*;

    fn at(d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 10, d)
            .and_then(|date| date.and_hms_opt(h, 0, 0))
            .expect("valid datetime")
    }

    #[tokio::test]
    async fn missing_file_opens_empty() {
        let temp = tempdir().expect("tempdir");
        let store = LocalStore::open(temp.path()).expect("open store");
        assert!(store.list_tasks().await.expect("list").is_empty());
        assert!(!store.tasks_path.exists());
    }

    #[tokio::test]
    async fn mutations_survive_reopen() {
        let temp = tempdir().expect("tempdir");
        let mut store = LocalStore::open(temp.path()).expect("open store");

        let first = store
            .create_task(NewTask::new("Write report", Some("q3"), at(15, 9)).expect("valid"))
            .await
            .expect("create first");
        let second = store
            .create_task(NewTask::new("Call bank", None, at(16, 10)).expect("valid"))
            .await
            .expect("create second");
        store.toggle_complete(&first.id).await.expect("toggle");
        store.delete_task(&second.id).await.expect("delete");

        let reopened = LocalStore::open(temp.path()).expect("reopen");
        let tasks = reopened.list_tasks().await.expect("list");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, first.id);
        assert!(tasks[0].completed);
        assert_eq!(tasks[0].description.as_deref(), Some("q3"));
    }

    #[tokio::test]
    async fn unknown_id_is_not_found_and_changes_nothing() {
        let temp = tempdir().expect("tempdir");
        let mut store = LocalStore::open(temp.path()).expect("open store");
        store
            .create_task(NewTask::new("Only", None, at(15, 9)).expect("valid"))
            .await
            .expect("create");

        let err = store
            .toggle_complete(&TaskId::new("missing"))
            .await
            .expect_err("missing id");
        assert!(matches!(err, StoreError::NotFound(_)));
        assert!(!store.list_tasks().await.expect("list")[0].completed);
    }

    #[tokio::test]
    async fn invalid_patch_leaves_task_untouched() {
        let temp = tempdir().expect("tempdir");
        let mut store = LocalStore::open(temp.path()).expect("open store");
        let task = store
            .create_task(NewTask::new("Keep me", None, at(15, 9)).expect("valid"))
            .await
            .expect("create");

        let patch = TaskPatch {
            title: Some("  ".to_string()),
            deadline: Some(at(20, 9)),
            ..TaskPatch::default()
        };
        let err = store.update_task(&task.id, patch).await.expect_err("blank title");
        assert!(matches!(err, StoreError::InvalidInput(_)));

        let reopened = LocalStore::open(temp.path()).expect("reopen");
        let stored = reopened.list_tasks().await.expect("list");
        assert_eq!(stored[0], task);
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let temp = tempdir().expect("tempdir");
        fs::write(temp.path().join(TASKS_FILE), "{not json").expect("write garbage");

        let err = LocalStore::open(temp.path()).expect_err("corrupt file");
        assert!(matches!(err, StoreError::Serialization(_)));
    }

    #[tokio::test]
    async fn default_queries_follow_bucket_rules() {
        let temp = tempdir().expect("tempdir");
        let mut store = LocalStore::open(temp.path()).expect("open store");
        for (title, deadline) in [("morning", at(15, 9)), ("evening", at(15, 20)), ("old", at(2, 9))] {
            store
                .create_task(NewTask::new(title, None, deadline).expect("valid"))
                .await
                .expect("create");
        }

        let now = at(15, 14);
        let today = store.today_tasks(now).await.expect("today");
        let backlog = store.backlog_tasks(now).await.expect("backlog");
        let titles = |tasks: &[Task]| tasks.iter().map(|t| t.title.clone()).collect::<Vec<_>>();

        assert_eq!(titles(&today), vec!["morning", "evening"]);
        assert_eq!(titles(&backlog), vec!["morning", "old"]);
    }
}
