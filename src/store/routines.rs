use std::ops::Deref;
use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use super::entity::EntityStore;
use super::optimistic::{modify, transact};
use crate::ai::Suggester;
use crate::config::LoadFailurePolicy;
use crate::error::{AppError, Result};
use crate::models::{to_owned_row, to_row, Record, Routine, RoutinePatch, RoutineTask, RoutineTemplate};
use crate::remote::{Filter, RemoteDataService};

/// Routines with their tasks, plus the templates saved from them.
pub struct RoutineStore {
    routines: EntityStore<Routine>,
    templates: EntityStore<RoutineTemplate>,
    suggester: Suggester,
}

impl Deref for RoutineStore {
    type Target = EntityStore<Routine>;

    fn deref(&self) -> &Self::Target {
        &self.routines
    }
}

impl RoutineStore {
    pub fn new(
        remote: Arc<dyn RemoteDataService>,
        suggester: Suggester,
        policy: LoadFailurePolicy,
    ) -> Self {
        Self {
            routines: EntityStore::new(remote.clone(), policy),
            templates: EntityStore::new(remote, policy),
            suggester,
        }
    }

    pub fn templates(&self) -> &EntityStore<RoutineTemplate> {
        &self.templates
    }

    /// Clears routines and templates alike.
    pub fn reset(&self, owner: Option<&str>) {
        self.routines.reset(owner);
        self.templates.reset(owner);
    }

    pub async fn rename(&self, routine_id: Uuid, name: impl Into<String>) -> Result<()> {
        let patch = RoutinePatch {
            name: Some(name.into()),
        };
        self.update(routine_id, patch).await
    }

    pub async fn add_task(&self, routine_id: Uuid, text: impl Into<String>) -> Result<RoutineTask> {
        let owner = self.require_owner()?;
        let _guard = self.collection().lock_id(routine_id).await;

        let task = RoutineTask::new(routine_id, text);
        let row = to_owned_row(&task, &owner)?;
        let local = task.clone();
        transact(
            self.collection(),
            "add task to",
            routine_id,
            |items| {
                modify(items, routine_id, |routine| {
                    routine.tasks.push(local);
                    routine.sort_tasks();
                })
            },
            self.remote().insert(RoutineTask::COLLECTION, vec![row]),
        )
        .await?;
        Ok(task)
    }

    /// Flips a routine task's checkmark. A task never checked counts as
    /// unchecked.
    pub async fn toggle_task(&self, routine_id: Uuid, task_id: Uuid) -> Result<()> {
        let _guard = self.collection().lock_id(routine_id).await;
        let task = self.require_task(routine_id, task_id)?;
        let completed = !task.completed.unwrap_or(false);

        let row = to_row(&json!({ "completed": completed }))?;
        transact(
            self.collection(),
            "toggle task of",
            routine_id,
            |items| {
                modify(items, routine_id, |routine| {
                    if let Some(task) = routine.tasks.iter_mut().find(|t| t.id == task_id) {
                        task.completed = Some(completed);
                    }
                })
            },
            self.remote().update(RoutineTask::COLLECTION, task_id, row),
        )
        .await
    }

    pub async fn remove_task(&self, routine_id: Uuid, task_id: Uuid) -> Result<()> {
        let _guard = self.collection().lock_id(routine_id).await;
        self.require_task(routine_id, task_id)?;
        transact(
            self.collection(),
            "remove task of",
            routine_id,
            |items| modify(items, routine_id, |routine| routine.tasks.retain(|t| t.id != task_id)),
            self.remote().delete(RoutineTask::COLLECTION, &Filter::id(task_id)),
        )
        .await
    }

    /// Adds suggested tasks for the routine's name in one insert. No
    /// suggestions means nothing changes.
    pub async fn generate_tasks(&self, routine_id: Uuid) -> Result<Vec<RoutineTask>> {
        let owner = self.require_owner()?;
        let routine = self.require(routine_id)?;

        let suggestions = self.suggester.routine_tasks(&routine.name).await;
        if suggestions.is_empty() {
            tracing::debug!("No task suggestions for routine {}", routine_id);
            return Ok(Vec::new());
        }

        let _guard = self.collection().lock_id(routine_id).await;
        let tasks: Vec<RoutineTask> = suggestions
            .into_iter()
            .map(|text| RoutineTask::new(routine_id, text))
            .collect();
        let rows = tasks
            .iter()
            .map(|t| to_owned_row(t, &owner))
            .collect::<Result<Vec<_>>>()?;

        let local = tasks.clone();
        transact(
            self.collection(),
            "add generated tasks to",
            routine_id,
            |items| {
                modify(items, routine_id, |routine| {
                    routine.tasks.extend(local);
                    routine.sort_tasks();
                })
            },
            self.remote().insert(RoutineTask::COLLECTION, rows),
        )
        .await?;
        Ok(tasks)
    }

    /// Stores a copy of the routine's task texts under `"<name> Template"`.
    /// Later edits to the routine do not reach the template.
    pub async fn save_as_template(&self, routine_id: Uuid) -> Result<RoutineTemplate> {
        let routine = self.require(routine_id)?;
        self.templates.create(RoutineTemplate::from_routine(&routine)).await
    }

    pub async fn remove_template(&self, template_id: Uuid) -> Result<()> {
        self.templates.remove(template_id).await
    }

    /// Builds a new routine from a template. Nothing is shown locally until
    /// both the routine and its tasks are stored; if the tasks cannot be
    /// stored the routine row is deleted again.
    pub async fn create_from_template(&self, template_id: Uuid) -> Result<Routine> {
        let owner = self.require_owner()?;
        let template = self.templates.require(template_id)?;
        let epoch = self.collection().epoch();

        let mut routine = Routine::new(template.routine_name());
        let tasks: Vec<RoutineTask> = template
            .tasks
            .iter()
            .map(|t| RoutineTask::new(routine.id, t.text.clone()))
            .collect();

        let row = to_owned_row(&routine, &owner)?;
        self.remote().insert(Routine::COLLECTION, vec![row]).await?;

        if !tasks.is_empty() {
            let rows = tasks
                .iter()
                .map(|t| to_owned_row(t, &owner))
                .collect::<Result<Vec<_>>>();
            let inserted = match rows {
                Ok(rows) => self.remote().insert(RoutineTask::COLLECTION, rows).await.map(|_| ()),
                Err(e) => Err(e),
            };
            if let Err(e) = inserted {
                tracing::error!(
                    "Failed to store tasks of routine {} from template {}: {}",
                    routine.id,
                    template_id,
                    e
                );
                self.discard_remote_routine(routine.id).await;
                return Err(e);
            }
        }

        routine.tasks = tasks;
        routine.sort_tasks();
        if !self.collection().place_confirmed(routine.clone(), epoch) {
            tracing::debug!("Session changed while routine {} was created", routine.id);
        }
        Ok(routine)
    }

    async fn discard_remote_routine(&self, routine_id: Uuid) {
        if let Err(e) = self
            .remote()
            .delete(Routine::COLLECTION, &Filter::id(routine_id))
            .await
        {
            tracing::error!("Failed to clean up routine {}: {}", routine_id, e);
        }
    }

    fn require_task(&self, routine_id: Uuid, task_id: Uuid) -> Result<RoutineTask> {
        self.require(routine_id)?
            .tasks
            .into_iter()
            .find(|t| t.id == task_id)
            .ok_or_else(|| AppError::not_found("routine task", task_id))
    }
}
