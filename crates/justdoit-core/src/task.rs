use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::datetime::deadline_serde;
use crate::error::{StoreError, StoreResult};

/// Opaque task identifier. Local tasks get a UUID; remote ids are whatever
/// the server hands out, numeric ids included.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for TaskId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(u64),
        }

        match RawId::deserialize(deserializer)? {
            RawId::Text(text) => Ok(Self(text)),
            RawId::Number(number) => Ok(Self(number.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    #[serde(alias = "_id")]
    pub id: TaskId,

    pub title: String,

    #[serde(default, deserialize_with = "empty_as_none")]
    pub description: Option<String>,

    #[serde(with = "deadline_serde")]
    pub deadline: NaiveDateTime,

    #[serde(default)]
    pub completed: bool,
}

impl Task {
    pub fn from_new(id: TaskId, new: NewTask) -> Self {
        Self {
            id,
            title: new.title,
            description: new.description,
            deadline: new.deadline,
            completed: false,
        }
    }

    pub fn deadline_day(&self) -> NaiveDate {
        self.deadline.date()
    }

    /// Incomplete and past its deadline instant.
    pub fn is_overdue(&self, now: NaiveDateTime) -> bool {
        !self.completed && self.deadline < now
    }
}

/// Contents of the add form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewTask {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(with = "deadline_serde")]
    pub deadline: NaiveDateTime,
}

impl NewTask {
    pub fn new(
        title: &str,
        description: Option<&str>,
        deadline: NaiveDateTime,
    ) -> StoreResult<Self> {
        Ok(Self {
            title: normalize_title(title)?,
            description: normalize_description(description),
            deadline,
        })
    }
}

/// Contents of the edit form. Unset fields keep their current value; an
/// empty description clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "deadline_serde::option"
    )]
    pub deadline: Option<NaiveDateTime>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.deadline.is_none()
    }

    /// Applies the patch to a copy of `task`, leaving `task` untouched if
    /// validation fails.
    pub fn apply_to(&self, task: &Task) -> StoreResult<Task> {
        let mut updated = task.clone();
        if let Some(title) = self.title.as_deref() {
            updated.title = normalize_title(title)?;
        }
        if let Some(description) = self.description.as_deref() {
            updated.description = normalize_description(Some(description));
        }
        if let Some(deadline) = self.deadline {
            updated.deadline = deadline;
        }
        Ok(updated)
    }

    /// Trimmed copy for sending over the wire. A description that trims to
    /// empty is kept as `""` so the server clears it.
    pub fn normalized(self) -> StoreResult<Self> {
        Ok(Self {
            title: self.title.as_deref().map(normalize_title).transpose()?,
            description: self.description.map(|text| text.trim().to_string()),
            deadline: self.deadline,
        })
    }
}

fn normalize_title(raw: &str) -> StoreResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(StoreError::InvalidInput(
            "title cannot be empty".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

fn normalize_description(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(normalize_description(raw.as_deref()))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|date| date.and_hms_opt(h, min, 0))
            .expect("valid datetime")
    }

    #[test]
    fn deserializes_browser_shaped_task() {
        let raw = r#"{"id":"1728990000000","title":"Pay rent","description":"","deadline":"2024-10-15T09:00","completed":false}"#;
        let task: Task = serde_json::from_str(raw).expect("parse task");

        assert_eq!(task.id.as_str(), "1728990000000");
        assert_eq!(task.description, None);
        assert_eq!(task.deadline, at(2024, 10, 15, 9, 0));
        assert!(!task.completed);
    }

    #[test]
    fn accepts_numeric_and_mongo_style_ids() {
        let numeric: Task =
            serde_json::from_str(r#"{"id":42,"title":"a","deadline":"2024-10-15T09:00"}"#)
                .expect("numeric id");
        assert_eq!(numeric.id, TaskId::new("42"));

        let mongo: Task = serde_json::from_str(
            r#"{"_id":"65f0c0ffee","title":"a","deadline":"2024-10-15T09:00:30"}"#,
        )
        .expect("underscore id");
        assert_eq!(mongo.id, TaskId::new("65f0c0ffee"));
        assert_eq!(mongo.deadline, at(2024, 10, 15, 9, 0));
    }

    #[test]
    fn serializes_deadline_in_form_format() {
        let task = Task::from_new(
            TaskId::new("t1"),
            NewTask::new("Ship", None, at(2024, 3, 1, 8, 5)).expect("valid task"),
        );
        let value = serde_json::to_value(&task).expect("serialize");
        assert_eq!(value["deadline"], "2024-03-01T08:05");
    }

    #[test]
    fn new_task_rejects_blank_title() {
        let err = NewTask::new("   ", Some("x"), at(2024, 1, 1, 0, 0)).expect_err("blank title");
        assert!(matches!(err, StoreError::InvalidInput(_)));
    }

    #[test]
    fn patch_keeps_unset_fields_and_clears_empty_description() {
        let task = Task {
            id: TaskId::new("t1"),
            title: "Old".to_string(),
            description: Some("notes".to_string()),
            deadline: at(2024, 5, 5, 10, 0),
            completed: true,
        };
        let patch = TaskPatch {
            title: Some("  New  ".to_string()),
            description: Some(String::new()),
            deadline: None,
        };

        let updated = patch.apply_to(&task).expect("apply patch");
        assert_eq!(updated.title, "New");
        assert_eq!(updated.description, None);
        assert_eq!(updated.deadline, task.deadline);
        assert!(updated.completed);
    }
}
