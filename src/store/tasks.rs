use std::ops::Deref;
use std::sync::Arc;

use uuid::Uuid;

use super::entity::EntityStore;
use super::optimistic::{modify, transact};
use crate::ai::Suggester;
use crate::config::LoadFailurePolicy;
use crate::error::{AppError, Result};
use crate::models::{to_owned_row, to_row, Patch, SubTask, SubTaskPatch, Task};
use crate::remote::{Filter, RemoteDataService};

/// Tasks together with their sub-tasks. Sub-task mutations lock and roll
/// back the parent task as a whole.
pub struct TaskStore {
    tasks: EntityStore<Task>,
    suggester: Suggester,
}

impl Deref for TaskStore {
    type Target = EntityStore<Task>;

    fn deref(&self) -> &Self::Target {
        &self.tasks
    }
}

impl TaskStore {
    pub fn new(
        remote: Arc<dyn RemoteDataService>,
        suggester: Suggester,
        policy: LoadFailurePolicy,
    ) -> Self {
        Self {
            tasks: EntityStore::new(remote, policy),
            suggester,
        }
    }

    pub async fn add_subtask(&self, task_id: Uuid, text: impl Into<String>) -> Result<SubTask> {
        let owner = self.require_owner()?;
        let _guard = self.collection().lock_id(task_id).await;

        let sub_task = SubTask::new(task_id, text);
        let row = to_owned_row(&sub_task, &owner)?;
        let local = sub_task.clone();
        transact(
            self.collection(),
            "add sub-task to",
            task_id,
            |items| {
                modify(items, task_id, |task| {
                    task.sub_tasks.push(local);
                    task.sort_subtasks();
                })
            },
            self.remote().insert(SubTask::COLLECTION, vec![row]),
        )
        .await?;
        Ok(sub_task)
    }

    pub async fn update_subtask(&self, task_id: Uuid, sub_task_id: Uuid, patch: SubTaskPatch) -> Result<()> {
        let _guard = self.collection().lock_id(task_id).await;
        self.require_subtask(task_id, sub_task_id)?;
        self.update_subtask_locked(task_id, sub_task_id, patch).await
    }

    pub async fn toggle_subtask(&self, task_id: Uuid, sub_task_id: Uuid) -> Result<()> {
        let _guard = self.collection().lock_id(task_id).await;
        let sub_task = self.require_subtask(task_id, sub_task_id)?;
        let patch = SubTaskPatch {
            completed: Some(!sub_task.completed),
            ..SubTaskPatch::default()
        };
        self.update_subtask_locked(task_id, sub_task_id, patch).await
    }

    async fn update_subtask_locked(&self, task_id: Uuid, sub_task_id: Uuid, patch: SubTaskPatch) -> Result<()> {
        let row = to_row(&patch)?;
        transact(
            self.collection(),
            "update sub-task of",
            task_id,
            |items| {
                modify(items, task_id, |task| {
                    if let Some(sub_task) = task.sub_tasks.iter_mut().find(|st| st.id == sub_task_id) {
                        patch.apply(sub_task);
                    }
                    task.sort_subtasks();
                })
            },
            self.remote().update(SubTask::COLLECTION, sub_task_id, row),
        )
        .await
    }

    pub async fn remove_subtask(&self, task_id: Uuid, sub_task_id: Uuid) -> Result<()> {
        let _guard = self.collection().lock_id(task_id).await;
        self.require_subtask(task_id, sub_task_id)?;
        transact(
            self.collection(),
            "remove sub-task of",
            task_id,
            |items| modify(items, task_id, |task| task.sub_tasks.retain(|st| st.id != sub_task_id)),
            self.remote().delete(SubTask::COLLECTION, &Filter::id(sub_task_id)),
        )
        .await
    }

    /// Asks for sub-task suggestions based on the task text and adds them all
    /// in one insert. No suggestions means nothing changes.
    pub async fn generate_subtasks(&self, task_id: Uuid) -> Result<Vec<SubTask>> {
        let owner = self.require_owner()?;
        let task = self.require(task_id)?;

        let suggestions = self.suggester.subtasks(&task.text).await;
        if suggestions.is_empty() {
            tracing::debug!("No sub-task suggestions for task {}", task_id);
            return Ok(Vec::new());
        }

        let _guard = self.collection().lock_id(task_id).await;
        let sub_tasks: Vec<SubTask> = suggestions
            .into_iter()
            .map(|text| SubTask::new(task_id, text))
            .collect();
        let rows = sub_tasks
            .iter()
            .map(|st| to_owned_row(st, &owner))
            .collect::<Result<Vec<_>>>()?;

        let local = sub_tasks.clone();
        transact(
            self.collection(),
            "add generated sub-tasks to",
            task_id,
            |items| {
                modify(items, task_id, |task| {
                    task.sub_tasks.extend(local);
                    task.sort_subtasks();
                })
            },
            self.remote().insert(SubTask::COLLECTION, rows),
        )
        .await?;
        Ok(sub_tasks)
    }

    fn require_subtask(&self, task_id: Uuid, sub_task_id: Uuid) -> Result<SubTask> {
        self.require(task_id)?
            .subtask(sub_task_id)
            .cloned()
            .ok_or_else(|| AppError::not_found("sub-task", sub_task_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::canned;
    use crate::models::Priority;
    use crate::remote::{MemoryDataService, Operation};

    fn setup(suggester: Suggester) -> (TaskStore, Arc<MemoryDataService>) {
        let remote = Arc::new(MemoryDataService::new());
        let store = TaskStore::new(remote.clone(), suggester, LoadFailurePolicy::FailClear);
        store.reset(Some("u1"));
        (store, remote)
    }

    async fn task_with_subtasks(store: &TaskStore, text: &str, subs: &[&str]) -> Task {
        let task = store.create(Task::new(text, Priority::High, None)).await.unwrap();
        for sub in subs {
            store.add_subtask(task.id, *sub).await.unwrap();
        }
        store.get(task.id).unwrap()
    }

    #[tokio::test]
    async fn toggling_twice_restores_completion() {
        let (store, remote) = setup(Suggester::default());
        let original = store.create(Task::new("File taxes", Priority::High, None)).await.unwrap();

        store.toggle(original.id).await.unwrap();
        let done = store.get(original.id).unwrap();
        assert!(done.completed);
        assert!(done.completed_at.is_some());

        store.toggle(original.id).await.unwrap();
        let back = store.get(original.id).unwrap();
        assert_eq!(back.completed, original.completed);
        assert_eq!(back.completed_at, original.completed_at);

        let row = remote.row("tasks", original.id).unwrap();
        assert_eq!(row["completed"], false);
        assert!(row["completed_at"].is_null());
    }

    #[tokio::test]
    async fn subtasks_are_kept_sorted_and_survive_reload() {
        let (store, _) = setup(Suggester::default());
        let task = task_with_subtasks(&store, "Move house", &["Pack", "Book van"]).await;

        let texts: Vec<_> = task.sub_tasks.iter().map(|st| st.text.as_str()).collect();
        assert_eq!(texts, vec!["Book van", "Pack"]);

        store.load_all("u1").await.unwrap();
        assert_eq!(store.get(task.id).unwrap().sub_tasks, task.sub_tasks);
    }

    #[tokio::test]
    async fn removing_a_task_cascades_to_its_subtasks() {
        let (store, remote) = setup(Suggester::default());
        let doomed = task_with_subtasks(&store, "Old project", &["a", "b"]).await;
        let kept = task_with_subtasks(&store, "New project", &["c"]).await;

        store.remove(doomed.id).await.unwrap();

        assert!(store.get(doomed.id).is_none());
        let remaining = remote.rows("sub_tasks");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0]["task_id"], kept.id.to_string());
        assert!(remote.row("tasks", doomed.id).is_none());
    }

    #[tokio::test]
    async fn failed_child_delete_keeps_parent_and_restores_everything() {
        let (store, remote) = setup(Suggester::default());
        let task = task_with_subtasks(&store, "Renovate", &["Paint", "Tile"]).await;
        remote.fail_next(Operation::Delete, "sub_tasks", 1);

        assert!(store.remove(task.id).await.is_err());

        assert_eq!(store.get(task.id), Some(task.clone()));
        assert!(remote.row("tasks", task.id).is_some());
        assert_eq!(remote.rows("sub_tasks").len(), 2);
        assert!(!remote
            .calls()
            .contains(&(Operation::Delete, "tasks".to_string())));
    }

    #[tokio::test]
    async fn failed_subtask_toggle_rolls_back() {
        let (store, remote) = setup(Suggester::default());
        let task = task_with_subtasks(&store, "Garden", &["Weed"]).await;
        let sub_id = task.sub_tasks[0].id;
        remote.fail_next(Operation::Update, "sub_tasks", 1);

        assert!(store.toggle_subtask(task.id, sub_id).await.is_err());
        assert_eq!(store.get(task.id), Some(task));
    }

    #[tokio::test]
    async fn failed_subtask_insert_is_removed_again() {
        let (store, remote) = setup(Suggester::default());
        let task = task_with_subtasks(&store, "Garden", &[]).await;
        remote.fail_next(Operation::Insert, "sub_tasks", 1);

        assert!(store.add_subtask(task.id, "Mow").await.is_err());
        assert!(store.get(task.id).unwrap().sub_tasks.is_empty());
    }

    #[tokio::test]
    async fn remove_subtask_deletes_only_that_row() {
        let (store, remote) = setup(Suggester::default());
        let task = task_with_subtasks(&store, "Trip", &["Tickets", "Hotel"]).await;
        let hotel = task.sub_tasks[0].id;

        store.remove_subtask(task.id, hotel).await.unwrap();

        let texts: Vec<_> = store.get(task.id).unwrap().sub_tasks.into_iter().map(|st| st.text).collect();
        assert_eq!(texts, vec!["Tickets"]);
        assert!(remote.row("sub_tasks", hotel).is_none());
    }

    #[tokio::test]
    async fn unknown_subtask_is_not_found() {
        let (store, _) = setup(Suggester::default());
        let task = task_with_subtasks(&store, "Trip", &[]).await;
        let err = store.toggle_subtask(task.id, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { kind: "sub-task", .. }));
    }

    #[tokio::test]
    async fn generated_subtasks_are_inserted_in_one_batch() {
        let (store, remote) = setup(canned(Ok(r#"{"subtasks": ["Draft", "Send"]}"#)));
        let task = task_with_subtasks(&store, "Write newsletter", &[]).await;

        let added = store.generate_subtasks(task.id).await.unwrap();
        assert_eq!(added.len(), 2);
        assert_eq!(store.get(task.id).unwrap().sub_tasks.len(), 2);
        let inserts = remote
            .calls()
            .into_iter()
            .filter(|call| *call == (Operation::Insert, "sub_tasks".to_string()))
            .count();
        assert_eq!(inserts, 1);
    }

    #[tokio::test]
    async fn empty_generation_changes_nothing() {
        let (store, remote) = setup(canned(Ok(r#"{"subtasks": []}"#)));
        let task = task_with_subtasks(&store, "Relax", &[]).await;

        let added = store.generate_subtasks(task.id).await.unwrap();
        assert!(added.is_empty());
        assert!(store.get(task.id).unwrap().sub_tasks.is_empty());
        assert!(remote.rows("sub_tasks").is_empty());
    }
}
