use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use super::collection::Collection;
use super::optimistic::{detach, modify, place, transact};
use super::{ListState, LoadState};
use crate::config::LoadFailurePolicy;
use crate::error::{AppError, Result};
use crate::models::{from_row, from_rows, to_owned_row, to_row, Patch, Record, Toggle};
use crate::remote::{Filter, RemoteDataService};

/// Mirror of one remote collection for the signed-in owner.
pub struct EntityStore<E: Record> {
    remote: Arc<dyn RemoteDataService>,
    collection: Collection<E>,
    policy: LoadFailurePolicy,
}

impl<E: Record> EntityStore<E> {
    pub fn new(remote: Arc<dyn RemoteDataService>, policy: LoadFailurePolicy) -> Self {
        Self {
            remote,
            collection: Collection::new(),
            policy,
        }
    }

    pub fn items(&self) -> Vec<E> {
        self.collection.items()
    }

    pub fn get(&self, id: Uuid) -> Option<E> {
        self.collection.get(id)
    }

    pub fn list_state(&self) -> ListState<E> {
        self.collection.list_state()
    }

    pub fn load_state(&self) -> LoadState {
        self.collection.load_state()
    }

    pub fn owner(&self) -> Option<String> {
        self.collection.owner()
    }

    /// Clears the store and scopes it to `owner` (or to nobody).
    pub fn reset(&self, owner: Option<&str>) {
        self.collection.reset(owner);
    }

    pub(crate) fn collection(&self) -> &Collection<E> {
        &self.collection
    }

    pub(crate) fn remote(&self) -> &Arc<dyn RemoteDataService> {
        &self.remote
    }

    pub(crate) fn require_owner(&self) -> Result<String> {
        self.collection.owner().ok_or(AppError::NoSession)
    }

    pub(crate) fn require(&self, id: Uuid) -> Result<E> {
        self.get(id).ok_or_else(|| AppError::not_found(E::KIND, id))
    }

    /// Replaces every item with the owner's rows. A result that arrives after
    /// the store was reset for someone else is dropped.
    pub async fn load_all(&self, owner: &str) -> Result<()> {
        let ticket = self.collection.begin_load(owner);
        let result = self.fetch(owner).await;
        self.collection
            .finish_load(owner, ticket, result, self.policy)
            .map(|_| ())
    }

    async fn fetch(&self, owner: &str) -> Result<Vec<E>> {
        let filter = Filter::owner(owner);
        match E::CHILDREN {
            None => from_rows(self.remote.select_all(E::COLLECTION, &filter).await?),
            Some(child) => {
                let (parents, children) = tokio::try_join!(
                    self.remote.select_all(E::COLLECTION, &filter),
                    self.remote.select_all(child.collection, &filter),
                )?;
                let mut items = from_rows(parents)?;
                E::attach_children(&mut items, children)?;
                Ok(items)
            }
        }
    }

    /// Shows `entity` immediately, then inserts it remotely. The entity is
    /// taken back out if the insert fails.
    pub async fn create(&self, entity: E) -> Result<E> {
        let owner = self.require_owner()?;
        let id = entity.id();
        let _guard = self.collection.lock_id(id).await;

        let row = to_owned_row(&entity, &owner)?;
        let local = entity.clone();
        let stored = transact(
            &self.collection,
            "create",
            id,
            |items| Ok(place(items, local)),
            self.remote.insert(E::COLLECTION, vec![row]),
        )
        .await?;

        match stored.into_iter().next().map(from_row::<E>) {
            Some(Ok(confirmed)) => {
                self.collection.with(|state| {
                    if let Some(local) = state.items.iter_mut().find(|e| e.id() == id) {
                        local.confirm(confirmed.clone());
                    }
                });
                Ok(confirmed)
            }
            Some(Err(e)) => {
                tracing::warn!("Unreadable {} row returned for {}: {}", E::KIND, id, e);
                Ok(entity)
            }
            None => Ok(entity),
        }
    }

    pub async fn update(&self, id: Uuid, patch: E::Patch) -> Result<()> {
        let _guard = self.collection.lock_id(id).await;
        self.update_locked(id, patch).await
    }

    /// `update` for callers already holding the id lock.
    pub(crate) async fn update_locked(&self, id: Uuid, patch: E::Patch) -> Result<()> {
        let row = to_row(&patch)?;
        transact(
            &self.collection,
            "update",
            id,
            |items| modify(items, id, |entity| patch.apply(entity)),
            self.remote.update(E::COLLECTION, id, row),
        )
        .await
    }

    /// Removes the entity and, for parent kinds, its children. Children are
    /// deleted remotely first; if that fails the parent is left alone and
    /// the whole entity comes back.
    pub async fn remove(&self, id: Uuid) -> Result<()> {
        let _guard = self.collection.lock_id(id).await;
        transact(
            &self.collection,
            "delete",
            id,
            |items| detach(items, id),
            async {
                if let Some(child) = E::CHILDREN {
                    let children = Filter::eq(child.parent_column, id.to_string());
                    self.remote.delete(child.collection, &children).await?;
                }
                self.remote.delete(E::COLLECTION, &Filter::id(id)).await
            },
        )
        .await
    }
}

impl<E: Toggle> EntityStore<E> {
    /// Flips the completion flag with a single-field patch.
    pub async fn toggle(&self, id: Uuid) -> Result<()> {
        let _guard = self.collection.lock_id(id).await;
        let entity = self.require(id)?;
        self.update_locked(id, entity.toggled(Utc::now())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Appointment, AppointmentPatch};
    use crate::remote::{MemoryDataService, Operation};
    use chrono::{NaiveDate, NaiveTime};

    fn setup(policy: LoadFailurePolicy) -> (EntityStore<Appointment>, Arc<MemoryDataService>) {
        let remote = Arc::new(MemoryDataService::new());
        let store = EntityStore::new(remote.clone(), policy);
        store.reset(Some("u1"));
        (store, remote)
    }

    fn dentist() -> Appointment {
        Appointment::new(
            "Dentist",
            NaiveDate::from_ymd_opt(2024, 3, 12).unwrap(),
            NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
        )
    }

    fn rename(text: &str) -> AppointmentPatch {
        AppointmentPatch {
            text: Some(text.to_string()),
            ..AppointmentPatch::default()
        }
    }

    #[tokio::test]
    async fn create_then_reload_contains_entity() {
        let (store, _) = setup(LoadFailurePolicy::FailClear);
        let created = store.create(dentist()).await.unwrap();

        store.load_all("u1").await.unwrap();
        assert_eq!(store.items(), vec![created]);
        assert_eq!(store.load_state(), LoadState::Ready);
    }

    #[tokio::test]
    async fn create_is_visible_before_remote_confirms() {
        let (store, _) = setup(LoadFailurePolicy::FailClear);
        let appointment = dentist();
        let id = appointment.id;

        let (created, seen) = tokio::join!(store.create(appointment), async {
            store.get(id).is_some()
        });
        assert!(seen);
        tokio_test::assert_ok!(created);
    }

    #[tokio::test]
    async fn failed_create_is_rolled_back() {
        let (store, remote) = setup(LoadFailurePolicy::FailClear);
        remote.fail_next(Operation::Insert, "appointments", 1);

        assert!(store.create(dentist()).await.is_err());
        assert!(store.items().is_empty());
        assert!(remote.rows("appointments").is_empty());
    }

    #[tokio::test]
    async fn create_without_session_is_rejected() {
        let remote = Arc::new(MemoryDataService::new());
        let store: EntityStore<Appointment> = EntityStore::new(remote, LoadFailurePolicy::FailClear);
        assert!(matches!(
            store.create(dentist()).await,
            Err(AppError::NoSession)
        ));
    }

    #[tokio::test]
    async fn failed_update_restores_exact_snapshot() {
        let (store, remote) = setup(LoadFailurePolicy::FailClear);
        let before = store.create(dentist()).await.unwrap();
        remote.fail_next(Operation::Update, "appointments", 1);

        let patch = AppointmentPatch {
            text: Some("Orthodontist".to_string()),
            time: NaiveTime::from_hms_opt(11, 0, 0),
            ..AppointmentPatch::default()
        };
        assert!(store.update(before.id, patch).await.is_err());
        assert_eq!(store.get(before.id), Some(before));
    }

    #[tokio::test]
    async fn racing_updates_end_on_the_last_one() {
        let (store, remote) = setup(LoadFailurePolicy::FailClear);
        let id = store.create(dentist()).await.unwrap().id;
        remote.fail_next(Operation::Update, "appointments", 1);

        let (first, second) = tokio::join!(store.update(id, rename("x")), store.update(id, rename("y")));
        assert!(first.is_err());
        tokio_test::assert_ok!(second);

        assert_eq!(store.get(id).unwrap().text, "y");
        assert_eq!(remote.row("appointments", id).unwrap()["text"], "y");
    }

    fn march(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    /// Reloads and checks nothing moved, i.e. the local rows already matched
    /// the remote ones.
    async fn assert_mirrors_remote(store: &EntityStore<Appointment>) {
        let mirrored = store.items();
        store.load_all("u1").await.unwrap();
        assert_eq!(store.items(), mirrored);
    }

    #[tokio::test]
    async fn create_racing_a_reload_survives_it() {
        for create_first in [true, false] {
            let (store, remote) = setup(LoadFailurePolicy::FailClear);
            let appointment = dentist();
            let id = appointment.id;

            let (created, loaded) = if create_first {
                tokio::join!(store.create(appointment), store.load_all("u1"))
            } else {
                let (loaded, created) =
                    tokio::join!(store.load_all("u1"), store.create(appointment));
                (created, loaded)
            };
            tokio_test::assert_ok!(created);
            tokio_test::assert_ok!(loaded);

            assert!(store.get(id).is_some());
            assert!(remote.row("appointments", id).is_some());
            assert_mirrors_remote(&store).await;
        }
    }

    #[tokio::test]
    async fn update_racing_a_reload_keeps_the_new_value() {
        for update_first in [true, false] {
            let (store, remote) = setup(LoadFailurePolicy::FailClear);
            let id = store.create(dentist()).await.unwrap().id;

            let (updated, loaded) = if update_first {
                tokio::join!(store.update(id, rename("B")), store.load_all("u1"))
            } else {
                let (loaded, updated) =
                    tokio::join!(store.load_all("u1"), store.update(id, rename("B")));
                (updated, loaded)
            };
            tokio_test::assert_ok!(updated);
            tokio_test::assert_ok!(loaded);

            assert_eq!(store.get(id).unwrap().text, "B");
            assert_eq!(remote.row("appointments", id).unwrap()["text"], "B");
            assert_mirrors_remote(&store).await;
        }
    }

    #[tokio::test]
    async fn failed_update_racing_a_reload_ends_on_the_stored_value() {
        for update_first in [true, false] {
            let (store, remote) = setup(LoadFailurePolicy::FailClear);
            let id = store.create(dentist()).await.unwrap().id;
            remote.fail_next(Operation::Update, "appointments", 1);

            let (updated, loaded) = if update_first {
                tokio::join!(store.update(id, rename("B")), store.load_all("u1"))
            } else {
                let (loaded, updated) =
                    tokio::join!(store.load_all("u1"), store.update(id, rename("B")));
                (updated, loaded)
            };
            assert!(updated.is_err());
            tokio_test::assert_ok!(loaded);

            assert_eq!(store.get(id).unwrap().text, "Dentist");
            assert_mirrors_remote(&store).await;
        }
    }

    #[tokio::test]
    async fn rescheduling_keeps_date_order() {
        let (store, _) = setup(LoadFailurePolicy::FailClear);
        let mut first = dentist();
        first.date = march(1);
        let first = store.create(first).await.unwrap();
        let mut second = dentist();
        second.date = march(10);
        store.create(second).await.unwrap();

        let patch = AppointmentPatch {
            date: Some(march(20)),
            ..AppointmentPatch::default()
        };
        store.update(first.id, patch).await.unwrap();

        let dates: Vec<NaiveDate> = store.items().iter().map(|a| a.date).collect();
        assert_eq!(dates, vec![march(10), march(20)]);
        assert_mirrors_remote(&store).await;
    }

    #[tokio::test]
    async fn failed_reschedule_restores_date_order() {
        let (store, remote) = setup(LoadFailurePolicy::FailClear);
        let mut first = dentist();
        first.date = march(1);
        let first = store.create(first).await.unwrap();
        let mut second = dentist();
        second.date = march(10);
        let second = store.create(second).await.unwrap();
        remote.fail_next(Operation::Update, "appointments", 1);

        let patch = AppointmentPatch {
            date: Some(march(20)),
            ..AppointmentPatch::default()
        };
        assert!(store.update(first.id, patch).await.is_err());
        assert_eq!(store.items(), vec![first, second]);
        assert_mirrors_remote(&store).await;
    }

    #[tokio::test]
    async fn finished_mutations_release_their_locks() {
        let (store, _) = setup(LoadFailurePolicy::FailClear);
        let id = store.create(dentist()).await.unwrap().id;
        assert_eq!(store.collection().tracked_ids(), 0);

        let (first, second) = tokio::join!(store.update(id, rename("x")), store.update(id, rename("y")));
        tokio_test::assert_ok!(first);
        tokio_test::assert_ok!(second);
        assert_eq!(store.collection().tracked_ids(), 0);

        store.remove(id).await.unwrap();
        assert_eq!(store.collection().tracked_ids(), 0);
    }

    #[tokio::test]
    async fn failed_remove_puts_entity_back_in_place() {
        let (store, remote) = setup(LoadFailurePolicy::FailClear);
        let early = store.create(dentist()).await.unwrap();
        let mut later = dentist();
        later.date = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
        let later = store.create(later).await.unwrap();
        remote.fail_next(Operation::Delete, "appointments", 1);

        assert!(store.remove(early.id).await.is_err());
        assert_eq!(store.items(), vec![early, later]);
    }

    #[tokio::test]
    async fn load_failure_policy_decides_what_stays() {
        for (policy, expect_items) in [
            (LoadFailurePolicy::FailClear, false),
            (LoadFailurePolicy::FailRetain, true),
        ] {
            let (store, remote) = setup(policy);
            store.create(dentist()).await.unwrap();
            remote.fail_next(Operation::Select, "appointments", 1);

            assert!(store.load_all("u1").await.is_err());
            assert!(matches!(store.load_state(), LoadState::Failed(_)));
            assert_eq!(!store.items().is_empty(), expect_items);
            if !expect_items {
                assert!(matches!(store.list_state(), ListState::Failed(_)));
            }
        }
    }

    #[tokio::test]
    async fn stale_load_is_discarded_after_owner_change() {
        let (store, _) = setup(LoadFailurePolicy::FailClear);
        store.create(dentist()).await.unwrap();

        let (loaded, _) = tokio::join!(store.load_all("u1"), async { store.reset(Some("u2")) });
        tokio_test::assert_ok!(loaded);
        assert_eq!(store.owner().as_deref(), Some("u2"));
        assert!(store.items().is_empty());
    }

    #[tokio::test]
    async fn rows_are_scoped_to_their_owner() {
        let (store, _) = setup(LoadFailurePolicy::FailClear);
        store.create(dentist()).await.unwrap();

        store.load_all("u2").await.unwrap();
        assert_eq!(store.list_state(), ListState::Empty);
    }
}
