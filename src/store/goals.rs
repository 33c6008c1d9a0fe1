use uuid::Uuid;

use super::entity::EntityStore;
use crate::error::Result;
use crate::models::{Goal, GoalPatch};

pub type GoalStore = EntityStore<Goal>;

impl EntityStore<Goal> {
    /// Links the task to the goal, or unlinks it if already linked. Links are
    /// not cleaned up when a task is deleted; readers skip dangling ids.
    pub async fn toggle_link(&self, goal_id: Uuid, task_id: Uuid) -> Result<()> {
        let _guard = self.collection().lock_id(goal_id).await;
        let goal = self.require(goal_id)?;
        let patch = GoalPatch {
            linked_task_ids: Some(goal.with_link_toggled(task_id)),
            ..GoalPatch::default()
        };
        self.update_locked(goal_id, patch).await
    }
}
