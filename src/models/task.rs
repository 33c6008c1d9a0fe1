use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{from_rows, ChildCollection, Patch, Record, Toggle};
use crate::error::Result;
use crate::remote::Row;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    pub fn label(&self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub text: String,
    pub priority: Priority,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Joined from `sub_tasks`; never part of the task row itself.
    #[serde(default, skip_serializing)]
    pub sub_tasks: Vec<SubTask>,
}

impl Task {
    pub fn new(text: impl Into<String>, priority: Priority, due_date: Option<NaiveDate>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            priority,
            due_date,
            completed: false,
            created_at: Utc::now(),
            completed_at: None,
            sub_tasks: Vec::new(),
        }
    }

    pub fn subtask(&self, id: Uuid) -> Option<&SubTask> {
        self.sub_tasks.iter().find(|st| st.id == id)
    }

    pub(crate) fn sort_subtasks(&mut self) {
        self.sub_tasks.sort_by(|a, b| a.text.cmp(&b.text));
    }
}

impl Record for Task {
    type Patch = TaskPatch;

    const COLLECTION: &'static str = "tasks";
    const KIND: &'static str = "task";
    const CHILDREN: Option<ChildCollection> = Some(ChildCollection {
        collection: SubTask::COLLECTION,
        parent_column: SubTask::PARENT_COLUMN,
    });

    fn id(&self) -> Uuid {
        self.id
    }

    fn display_order(a: &Self, b: &Self) -> Ordering {
        b.created_at.cmp(&a.created_at)
    }

    fn confirm(&mut self, stored: Self) {
        let sub_tasks = std::mem::take(&mut self.sub_tasks);
        *self = stored;
        self.sub_tasks = sub_tasks;
    }

    fn attach_children(tasks: &mut [Self], rows: Vec<Row>) -> Result<()> {
        let mut by_task: HashMap<Uuid, Vec<SubTask>> = HashMap::new();
        for sub_task in from_rows::<SubTask>(rows)? {
            by_task.entry(sub_task.task_id).or_default().push(sub_task);
        }
        for task in tasks.iter_mut() {
            task.sub_tasks = by_task.remove(&task.id).unwrap_or_default();
            task.sort_subtasks();
        }
        Ok(())
    }
}

impl Toggle for Task {
    fn toggled(&self, now: DateTime<Utc>) -> TaskPatch {
        let completed = !self.completed;
        TaskPatch {
            completed: Some(completed),
            completed_at: Some(completed.then_some(now)),
            ..TaskPatch::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<Option<NaiveDate>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Option<DateTime<Utc>>>,
}

impl TaskPatch {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }
}

impl Patch<Task> for TaskPatch {
    fn apply(&self, task: &mut Task) {
        if let Some(text) = &self.text {
            task.text = text.clone();
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(due_date) = self.due_date {
            task.due_date = due_date;
        }
        if let Some(completed) = self.completed {
            task.completed = completed;
        }
        if let Some(completed_at) = self.completed_at {
            task.completed_at = completed_at;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubTask {
    pub id: Uuid,
    pub task_id: Uuid,
    pub text: String,
    #[serde(default)]
    pub completed: bool,
}

impl SubTask {
    pub const COLLECTION: &'static str = "sub_tasks";
    pub const PARENT_COLUMN: &'static str = "task_id";

    pub fn new(task_id: Uuid, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            text: text.into(),
            completed: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SubTaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

impl Patch<SubTask> for SubTaskPatch {
    fn apply(&self, sub_task: &mut SubTask) {
        if let Some(text) = &self.text {
            sub_task.text = text.clone();
        }
        if let Some(completed) = self.completed {
            sub_task.completed = completed;
        }
    }
}
