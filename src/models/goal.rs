use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Patch, Record, Toggle};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub target_date: Option<NaiveDate>,
    #[serde(default)]
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    /// Weak links: ids of tasks that may since have been deleted.
    #[serde(default)]
    pub linked_task_ids: Vec<Uuid>,
}

impl Goal {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        target_date: Option<NaiveDate>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            description: description.into(),
            target_date,
            completed: false,
            created_at: Utc::now(),
            linked_task_ids: Vec::new(),
        }
    }

    pub fn is_linked(&self, task_id: Uuid) -> bool {
        self.linked_task_ids.contains(&task_id)
    }

    /// Link list with `task_id` added, or removed if it was already linked.
    pub fn with_link_toggled(&self, task_id: Uuid) -> Vec<Uuid> {
        if self.is_linked(task_id) {
            self.linked_task_ids
                .iter()
                .copied()
                .filter(|id| *id != task_id)
                .collect()
        } else {
            let mut ids = self.linked_task_ids.clone();
            ids.push(task_id);
            ids
        }
    }
}

impl Record for Goal {
    type Patch = GoalPatch;

    const COLLECTION: &'static str = "goals";
    const KIND: &'static str = "goal";

    fn id(&self) -> Uuid {
        self.id
    }

    fn display_order(a: &Self, b: &Self) -> Ordering {
        b.created_at.cmp(&a.created_at)
    }
}

impl Toggle for Goal {
    fn toggled(&self, _now: DateTime<Utc>) -> GoalPatch {
        GoalPatch {
            completed: Some(!self.completed),
            ..GoalPatch::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GoalPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_date: Option<Option<NaiveDate>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked_task_ids: Option<Vec<Uuid>>,
}

impl Patch<Goal> for GoalPatch {
    fn apply(&self, goal: &mut Goal) {
        if let Some(title) = &self.title {
            goal.title = title.clone();
        }
        if let Some(description) = &self.description {
            goal.description = description.clone();
        }
        if let Some(target_date) = self.target_date {
            goal.target_date = target_date;
        }
        if let Some(completed) = self.completed {
            goal.completed = completed;
        }
        if let Some(ids) = &self.linked_task_ids {
            goal.linked_task_ids = ids.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_toggle_adds_then_removes() {
        let mut goal = Goal::new("Run a marathon", "", None);
        let task_id = Uuid::new_v4();

        goal.linked_task_ids = goal.with_link_toggled(task_id);
        assert!(goal.is_linked(task_id));

        goal.linked_task_ids = goal.with_link_toggled(task_id);
        assert!(goal.linked_task_ids.is_empty());
    }
}
