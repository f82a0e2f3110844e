//! Task persistence behind one interface, with a local-file variant and a
//! remote-API variant.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};

use crate::bucket::{is_backlog, is_due_on};
use crate::error::StoreResult;
use crate::task::{NewTask, Task, TaskId, TaskPatch};

pub mod local;
pub mod remote;

pub use local::LocalStore;
pub use remote::RemoteStore;

/// A collection of tasks that can be queried and mutated.
///
/// Every mutation either succeeds and is visible to the next
/// [`list_tasks`](TaskStore::list_tasks), or fails and leaves the collection
/// as it was.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Short name used in logs
    fn kind(&self) -> &'static str;

    async fn list_tasks(&self) -> StoreResult<Vec<Task>>;

    /// Tasks whose deadline falls on `day`, in collection order
    async fn tasks_on(&self, day: NaiveDate) -> StoreResult<Vec<Task>> {
        let tasks = self.list_tasks().await?;
        Ok(tasks.into_iter().filter(|task| is_due_on(task, day)).collect())
    }

    async fn today_tasks(&self, now: NaiveDateTime) -> StoreResult<Vec<Task>> {
        self.tasks_on(now.date()).await
    }

    /// Incomplete tasks whose deadline instant is before `now`
    async fn backlog_tasks(&self, now: NaiveDateTime) -> StoreResult<Vec<Task>> {
        let tasks = self.list_tasks().await?;
        Ok(tasks.into_iter().filter(|task| is_backlog(task, now)).collect())
    }

    async fn create_task(&mut self, new: NewTask) -> StoreResult<Task>;

    async fn update_task(&mut self, id: &TaskId, patch: TaskPatch) -> StoreResult<Task>;

    async fn delete_task(&mut self, id: &TaskId) -> StoreResult<()>;

    /// Flips the completed flag and returns the updated task
    async fn toggle_complete(&mut self, id: &TaskId) -> StoreResult<Task>;
}
