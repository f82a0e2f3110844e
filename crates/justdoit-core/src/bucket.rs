//! Splits the task collection into the three lists shown next to the
//! calendar.
//!
//! The lists are independent filters over the same collection, not a
//! partition: a task due earlier today is both a today task and a backlog
//! task. "Today" and "selected day" compare calendar days; the backlog
//! compares exact timestamps.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::task::Task;

/// The list a set of tasks is displayed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskSection {
    Today,
    SelectedDay,
    Backlog,
}

impl TaskSection {
    pub fn title(self) -> &'static str {
        match self {
            TaskSection::Today => "Today",
            TaskSection::SelectedDay => "Selected day",
            TaskSection::Backlog => "Backlog",
        }
    }

    /// Overdue styling only applies inside the backlog list.
    pub fn context(self) -> ListContext {
        match self {
            TaskSection::Backlog => ListContext::Backlog,
            TaskSection::Today | TaskSection::SelectedDay => ListContext::Default,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ListContext {
    Default,
    Backlog,
}

impl ListContext {
    pub fn marks_overdue(self, task: &Task, now: NaiveDateTime) -> bool {
        self == ListContext::Backlog && task.is_overdue(now)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskBuckets<'a> {
    pub today: Vec<&'a Task>,
    pub selected_day: Vec<&'a Task>,
    pub backlog: Vec<&'a Task>,
}

impl<'a> TaskBuckets<'a> {
    pub fn section(&self, section: TaskSection) -> &[&'a Task] {
        match section {
            TaskSection::Today => &self.today,
            TaskSection::SelectedDay => &self.selected_day,
            TaskSection::Backlog => &self.backlog,
        }
    }
}

pub fn is_due_on(task: &Task, day: NaiveDate) -> bool {
    task.deadline_day() == day
}

pub fn is_backlog(task: &Task, now: NaiveDateTime) -> bool {
    task.is_overdue(now)
}

#[tracing::instrument(skip(tasks), fields(total = tasks.len()))]
pub fn bucket_tasks<'a>(
    tasks: &'a [Task],
    now: NaiveDateTime,
    selected: Option<NaiveDate>,
) -> TaskBuckets<'a> {
    let today = now.date();

    let buckets = TaskBuckets {
        today: tasks.iter().filter(|task| is_due_on(task, today)).collect(),
        selected_day: match selected {
            Some(day) => tasks.iter().filter(|task| is_due_on(task, day)).collect(),
            None => Vec::new(),
        },
        backlog: tasks.iter().filter(|task| is_backlog(task, now)).collect(),
    };

    tracing::debug!(
        today = buckets.today.len(),
        selected_day = buckets.selected_day.len(),
        backlog = buckets.backlog.len(),
        "tasks bucketed"
    );
    buckets
}
