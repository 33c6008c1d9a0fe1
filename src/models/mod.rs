mod appointment;
mod goal;
mod routine;
mod task;
mod user;

pub use appointment::{Appointment, AppointmentPatch};
pub use goal::{Goal, GoalPatch};
pub use routine::{Routine, RoutinePatch, RoutineTask, RoutineTemplate, TemplatePatch, TemplateTask};
pub use task::{Priority, SubTask, SubTaskPatch, Task, TaskPatch};
pub use user::Principal;

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::remote::Row;

/// Column every row carries to scope it to its owner.
pub const OWNER_COLUMN: &str = "user_id";

/// An entity mirrored from one remote collection.
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    type Patch: Patch<Self>;

    const COLLECTION: &'static str;
    const KIND: &'static str;

    /// Child rows owned by this kind, if any.
    const CHILDREN: Option<ChildCollection> = None;

    fn id(&self) -> Uuid;

    /// Display order of the collection. New entities are inserted in front
    /// of the first entity they do not sort after.
    fn display_order(a: &Self, b: &Self) -> Ordering;

    /// Takes over the row the remote side stored for this entity.
    fn confirm(&mut self, stored: Self) {
        *self = stored;
    }

    /// Joins child rows, fetched separately, onto their parents.
    fn attach_children(_parents: &mut [Self], _rows: Vec<Row>) -> Result<()> {
        Ok(())
    }
}

/// A collection whose rows belong to a parent row through a foreign key.
/// Children are deleted before their parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildCollection {
    pub collection: &'static str,
    pub parent_column: &'static str,
}

/// A partial update. Serializes to the row fields it changes and nothing else.
pub trait Patch<E>: Serialize + Send + Sync {
    fn apply(&self, entity: &mut E);
}

/// Entities with a completion flag that can be flipped in one patch.
pub trait Toggle: Record {
    fn toggled(&self, now: DateTime<Utc>) -> Self::Patch;
}

pub fn to_row<T: Serialize>(value: &T) -> Result<Row> {
    match serde_json::to_value(value)? {
        Value::Object(row) => Ok(row),
        other => Err(AppError::Remote(format!("expected an object row, got {}", other))),
    }
}

pub fn to_owned_row<T: Serialize>(value: &T, owner: &str) -> Result<Row> {
    let mut row = to_row(value)?;
    row.insert(OWNER_COLUMN.to_string(), Value::String(owner.to_string()));
    Ok(row)
}

pub fn from_row<T: DeserializeOwned>(row: Row) -> Result<T> {
    Ok(serde_json::from_value(Value::Object(row))?)
}

pub fn from_rows<T: DeserializeOwned>(rows: Vec<Row>) -> Result<Vec<T>> {
    rows.into_iter().map(from_row).collect()
}

/// Where `item` goes in a list already in display order.
pub(crate) fn insertion_index<E: Record>(items: &[E], item: &E) -> usize {
    items
        .iter()
        .position(|existing| E::display_order(item, existing) != Ordering::Greater)
        .unwrap_or(items.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owned_row_carries_owner_and_skips_children() {
        let mut task = Task::new("Write report", Priority::High, None);
        task.sub_tasks.push(SubTask::new(task.id, "Outline"));

        let row = to_owned_row(&task, "user-1").unwrap();
        assert_eq!(row[OWNER_COLUMN], "user-1");
        assert_eq!(row["priority"], "high");
        assert!(!row.contains_key("sub_tasks"));

        let back: Task = from_row(row).unwrap();
        assert_eq!(back.id, task.id);
        assert!(back.sub_tasks.is_empty());
    }

    #[test]
    fn newest_first_insertion_goes_to_front() {
        let older = Task::new("older", Priority::Low, None);
        let mut newer = Task::new("newer", Priority::Low, None);
        newer.created_at = older.created_at + chrono::Duration::seconds(5);

        assert_eq!(insertion_index(&[older], &newer), 0);
    }
}
