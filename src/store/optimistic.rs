use std::cmp::Ordering;
use std::future::Future;

use uuid::Uuid;

use super::collection::Collection;
use crate::error::{AppError, Result};
use crate::models::{insertion_index, Record};

/// Inverse of one optimistic mutation.
#[derive(Debug, Clone)]
pub(crate) enum Undo<E> {
    /// Drop an entity that was added.
    Remove(Uuid),
    /// Put an entity back exactly as it was, at its old position.
    Restore { index: usize, entity: E },
}

impl<E: Record> Undo<E> {
    pub(crate) fn revert(self, items: &mut Vec<E>) {
        match self {
            Undo::Remove(id) => items.retain(|e| e.id() != id),
            Undo::Restore { index, entity } => {
                items.retain(|e| e.id() != entity.id());
                settle_at(items, entity, index);
            }
        }
    }
}

/// What one mutation left behind for its id, so it can be laid over a
/// snapshot that was read before the write reached the remote side.
#[derive(Debug, Clone)]
pub(crate) enum Redo<E> {
    Put(E),
    Drop(Uuid),
}

impl<E: Record> Redo<E> {
    pub(crate) fn capture(items: &[E], id: Uuid) -> Self {
        match items.iter().find(|e| e.id() == id) {
            Some(entity) => Redo::Put(entity.clone()),
            None => Redo::Drop(id),
        }
    }

    pub(crate) fn replay(self, items: &mut Vec<E>) {
        match self {
            Redo::Put(entity) => match items.iter().position(|e| e.id() == entity.id()) {
                Some(index) => {
                    items.remove(index);
                    settle_at(items, entity, index);
                }
                None => {
                    let index = insertion_index(items, &entity);
                    items.insert(index, entity);
                }
            },
            Redo::Drop(id) => items.retain(|e| e.id() != id),
        }
    }
}

/// Inserts `entity` at `preferred` if that keeps the display order, otherwise
/// where the order puts it.
fn settle_at<E: Record>(items: &mut Vec<E>, entity: E, preferred: usize) {
    let index = preferred.min(items.len());
    let fits = (index == 0 || E::display_order(&items[index - 1], &entity) != Ordering::Greater)
        && (index == items.len() || E::display_order(&entity, &items[index]) != Ordering::Greater);
    let index = if fits {
        index
    } else {
        insertion_index(items, &entity)
    };
    items.insert(index, entity);
}

pub(crate) fn place<E: Record>(items: &mut Vec<E>, entity: E) -> Undo<E> {
    let id = entity.id();
    let index = insertion_index(items, &entity);
    items.insert(index, entity);
    Undo::Remove(id)
}

/// Edits one entity and moves it if the edit changed where it sorts.
pub(crate) fn modify<E: Record>(
    items: &mut Vec<E>,
    id: Uuid,
    f: impl FnOnce(&mut E),
) -> Result<Undo<E>> {
    let index = items
        .iter()
        .position(|e| e.id() == id)
        .ok_or_else(|| AppError::not_found(E::KIND, id))?;
    let mut entity = items.remove(index);
    let undo = Undo::Restore {
        index,
        entity: entity.clone(),
    };
    f(&mut entity);
    settle_at(items, entity, index);
    Ok(undo)
}

pub(crate) fn detach<E: Record>(items: &mut Vec<E>, id: Uuid) -> Result<Undo<E>> {
    let index = items
        .iter()
        .position(|e| e.id() == id)
        .ok_or_else(|| AppError::not_found(E::KIND, id))?;
    let entity = items.remove(index);
    Ok(Undo::Restore { index, entity })
}

/// Applies `apply` to the local items right away, then awaits `remote`.
/// When the remote call fails the mutation is undone, unless the collection
/// was reset for another owner in the meantime.
///
/// A load that commits while `remote` is pending lays this mutation over its
/// snapshot, and one that commits after it settled replays it too, so the
/// items never fall back to rows read before the write landed.
pub(crate) async fn transact<E, T, Fut>(
    collection: &Collection<E>,
    action: &str,
    id: Uuid,
    apply: impl FnOnce(&mut Vec<E>) -> Result<Undo<E>>,
    remote: Fut,
) -> Result<T>
where
    E: Record,
    Fut: Future<Output = Result<T>>,
{
    let (undo, epoch, ticket) = collection.with(|state| {
        let undo = apply(&mut state.items)?;
        let redo = Redo::capture(&state.items, id);
        let ticket = state.begin_mutation(redo);
        Ok::<_, AppError>((undo, state.epoch, ticket))
    })?;

    match remote.await {
        Ok(value) => {
            collection.with(|state| {
                if state.epoch == epoch {
                    state.settle_mutation(ticket, true);
                }
            });
            Ok(value)
        }
        Err(e) => {
            tracing::error!("Failed to {} {} {}, rolling back: {}", action, E::KIND, id, e);
            let reverted = collection.with(|state| {
                if state.epoch != epoch {
                    return false;
                }
                state.settle_mutation(ticket, false);
                undo.revert(&mut state.items);
                true
            });
            if !reverted {
                tracing::debug!("Skipped rollback of {} {}: session changed", E::KIND, id);
            }
            Err(e)
        }
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Priority, Task};

    fn tasks(n: usize) -> Vec<Task> {
        let base = chrono::Utc::now();
        let mut items: Vec<Task> = (0..n)
            .map(|i| {
                let mut t = Task::new(format!("task {}", i), Priority::Low, None);
                t.created_at = base - chrono::Duration::minutes(i as i64);
                t
            })
            .collect();
        items.sort_by(<Task as Record>::display_order);
        items
    }

    #[test]
    fn detach_then_revert_restores_position() {
        let mut items = tasks(3);
        let original = items.clone();

        let undo = detach(&mut items, original[1].id).unwrap();
        assert_eq!(items.len(), 2);

        undo.revert(&mut items);
        assert_eq!(items, original);
    }

    #[test]
    fn modify_revert_restores_untouched_fields() {
        let mut items = tasks(2);
        items[0].due_date = chrono::NaiveDate::from_ymd_opt(2024, 5, 1);
        let original = items.clone();

        let undo = modify(&mut items, original[0].id, |t| t.text = "changed".into()).unwrap();
        assert_eq!(items[0].text, "changed");

        undo.revert(&mut items);
        assert_eq!(items, original);
    }

    #[test]
    fn modify_keeps_display_order_and_revert_restores_it() {
        let mut items = tasks(3);
        let original = items.clone();
        let oldest = original[2].created_at;

        let undo = modify(&mut items, original[0].id, |t| {
            t.created_at = oldest - chrono::Duration::minutes(1)
        })
        .unwrap();
        let order: Vec<Uuid> = items.iter().map(|t| t.id).collect();
        assert_eq!(order, vec![original[1].id, original[2].id, original[0].id]);

        undo.revert(&mut items);
        assert_eq!(items, original);
    }

    #[test]
    fn replayed_put_replaces_the_stale_row() {
        let mut items = tasks(2);
        let mut edited = items[1].clone();
        edited.text = "edited".into();

        Redo::Put(edited.clone()).replay(&mut items);
        assert_eq!(items.len(), 2);
        assert_eq!(items[1], edited);

        Redo::<Task>::Drop(edited.id).replay(&mut items);
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn missing_entity_is_not_found() {
        let mut items = tasks(1);
        let err = modify(&mut items, Uuid::new_v4(), |_| {}).unwrap_err();
        assert!(matches!(err, AppError::NotFound { kind: "task", .. }));
    }
}
