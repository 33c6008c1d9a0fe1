use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{from_rows, ChildCollection, Patch, Record};
use crate::error::Result;
use crate::remote::Row;

/// Suffix added to a routine name when it is saved as a template.
pub const TEMPLATE_SUFFIX: &str = " Template";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Routine {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing)]
    pub tasks: Vec<RoutineTask>,
}

impl Routine {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            created_at: Utc::now(),
            tasks: Vec::new(),
        }
    }

    pub(crate) fn sort_tasks(&mut self) {
        self.tasks.sort_by(|a, b| a.text.cmp(&b.text));
    }

    pub fn template_name(&self) -> String {
        format!("{}{}", self.name, TEMPLATE_SUFFIX)
    }
}

impl Record for Routine {
    type Patch = RoutinePatch;

    const COLLECTION: &'static str = "routines";
    const KIND: &'static str = "routine";
    const CHILDREN: Option<ChildCollection> = Some(ChildCollection {
        collection: RoutineTask::COLLECTION,
        parent_column: RoutineTask::PARENT_COLUMN,
    });

    fn id(&self) -> Uuid {
        self.id
    }

    fn display_order(a: &Self, b: &Self) -> Ordering {
        b.created_at.cmp(&a.created_at)
    }

    fn confirm(&mut self, stored: Self) {
        let tasks = std::mem::take(&mut self.tasks);
        *self = stored;
        self.tasks = tasks;
    }

    fn attach_children(routines: &mut [Self], rows: Vec<Row>) -> Result<()> {
        let mut by_routine: HashMap<Uuid, Vec<RoutineTask>> = HashMap::new();
        for task in from_rows::<RoutineTask>(rows)? {
            by_routine.entry(task.routine_id).or_default().push(task);
        }
        for routine in routines.iter_mut() {
            routine.tasks = by_routine.remove(&routine.id).unwrap_or_default();
            routine.sort_tasks();
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RoutinePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Patch<Routine> for RoutinePatch {
    fn apply(&self, routine: &mut Routine) {
        if let Some(name) = &self.name {
            routine.name = name.clone();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutineTask {
    pub id: Uuid,
    pub routine_id: Uuid,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

impl RoutineTask {
    pub const COLLECTION: &'static str = "routine_tasks";
    pub const PARENT_COLUMN: &'static str = "routine_id";

    pub fn new(routine_id: Uuid, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            routine_id,
            text: text.into(),
            completed: None,
        }
    }
}

/// Frozen copy of a routine's task texts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateTask {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutineTemplate {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub tasks: Vec<TemplateTask>,
}

impl RoutineTemplate {
    pub fn from_routine(routine: &Routine) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: routine.template_name(),
            created_at: Utc::now(),
            tasks: routine
                .tasks
                .iter()
                .map(|t| TemplateTask {
                    text: t.text.clone(),
                })
                .collect(),
        }
    }

    /// Name for a routine materialized from this template.
    pub fn routine_name(&self) -> String {
        let name = self.name.strip_suffix(TEMPLATE_SUFFIX).unwrap_or(&self.name);
        name.trim().to_string()
    }
}

impl Record for RoutineTemplate {
    type Patch = TemplatePatch;

    const COLLECTION: &'static str = "routine_templates";
    const KIND: &'static str = "template";

    fn id(&self) -> Uuid {
        self.id
    }

    fn display_order(a: &Self, b: &Self) -> Ordering {
        b.created_at.cmp(&a.created_at)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TemplatePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Patch<RoutineTemplate> for TemplatePatch {
    fn apply(&self, template: &mut RoutineTemplate) {
        if let Some(name) = &self.name {
            template.name = name.clone();
        }
    }
}
