use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use super::optimistic::Redo;
use super::{ListState, LoadState};
use crate::config::LoadFailurePolicy;
use crate::error::Result;
use crate::models::Record;

type IdLocks = Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>;

#[derive(Debug)]
pub(crate) struct State<E> {
    pub items: Vec<E>,
    pub owner: Option<String>,
    /// Bumped whenever the collection is reset for a new owner. Work started
    /// under an older epoch must not touch the items.
    pub epoch: u64,
    pub load: LoadState,
    seq: u64,
    /// Optimistic mutations still waiting on the remote side, by ticket.
    pending: BTreeMap<u64, Redo<E>>,
    /// Mutations confirmed while a load was in flight.
    settled: Vec<(u64, Redo<E>)>,
    loads_in_flight: usize,
}

impl<E: Record> State<E> {
    pub fn begin_mutation(&mut self, redo: Redo<E>) -> u64 {
        self.seq += 1;
        self.pending.insert(self.seq, redo);
        self.seq
    }

    /// Retires a mutation. A confirmed one is kept for replay if a load that
    /// may have read the rows before it landed is still running.
    pub fn settle_mutation(&mut self, ticket: u64, confirmed: bool) {
        if let Some(redo) = self.pending.remove(&ticket) {
            if confirmed {
                self.record_settled(redo);
            }
        }
    }

    fn record_settled(&mut self, redo: Redo<E>) {
        if self.loads_in_flight > 0 {
            self.seq += 1;
            self.settled.push((self.seq, redo));
        }
    }

    /// Lays every mutation the snapshot of a load started at `since` may have
    /// missed over the freshly loaded items, oldest first.
    fn replay_since(&mut self, since: u64) {
        let mut redos: Vec<(u64, Redo<E>)> = self
            .settled
            .iter()
            .filter(|(seq, _)| *seq > since)
            .cloned()
            .chain(self.pending.iter().map(|(seq, redo)| (*seq, redo.clone())))
            .collect();
        redos.sort_by_key(|(seq, _)| *seq);
        for (_, redo) in redos {
            redo.replay(&mut self.items);
        }
    }
}

/// Identifies one running load: the epoch it belongs to and the last
/// mutation it could have seen.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LoadTicket {
    epoch: u64,
    seq: u64,
}

/// The in-memory rows of one entity kind for the current owner.
#[derive(Debug)]
pub(crate) struct Collection<E> {
    state: Mutex<State<E>>,
    id_locks: IdLocks,
}

impl<E: Record> Collection<E> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                items: Vec::new(),
                owner: None,
                epoch: 0,
                load: LoadState::Idle,
                seq: 0,
                pending: BTreeMap::new(),
                settled: Vec::new(),
                loads_in_flight: 0,
            }),
            id_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut State<E>) -> R) -> R {
        f(&mut self.lock_state())
    }

    fn lock_state(&self) -> MutexGuard<'_, State<E>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn items(&self) -> Vec<E> {
        self.lock_state().items.clone()
    }

    pub fn get(&self, id: Uuid) -> Option<E> {
        self.lock_state().items.iter().find(|e| e.id() == id).cloned()
    }

    pub fn owner(&self) -> Option<String> {
        self.lock_state().owner.clone()
    }

    pub fn epoch(&self) -> u64 {
        self.lock_state().epoch
    }

    pub fn load_state(&self) -> LoadState {
        self.lock_state().load.clone()
    }

    pub fn list_state(&self) -> ListState<E> {
        let state = self.lock_state();
        match &state.load {
            LoadState::Loading if state.items.is_empty() => ListState::Loading,
            LoadState::Failed(message) if state.items.is_empty() => {
                ListState::Failed(message.clone())
            }
            _ if state.items.is_empty() => ListState::Empty,
            _ => ListState::Items(state.items.clone()),
        }
    }

    /// Drops every row and starts over for `owner`.
    pub fn reset(&self, owner: Option<&str>) {
        let mut state = self.lock_state();
        state.items.clear();
        state.owner = owner.map(str::to_string);
        state.epoch += 1;
        state.load = LoadState::Idle;
        state.pending.clear();
        state.settled.clear();
        state.loads_in_flight = 0;
        drop(state);

        lock_map(&self.id_locks).clear();
    }

    /// Marks a load as started. Switching owners resets the collection first.
    pub fn begin_load(&self, owner: &str) -> LoadTicket {
        if self.owner().as_deref() != Some(owner) {
            self.reset(Some(owner));
        }
        let mut state = self.lock_state();
        state.load = LoadState::Loading;
        state.loads_in_flight += 1;
        LoadTicket {
            epoch: state.epoch,
            seq: state.seq,
        }
    }

    /// Commits a load result unless the owner changed while it was in flight.
    /// Mutations the snapshot may have missed are laid back on top of it.
    /// Returns `Ok(false)` when the result was discarded as stale.
    pub fn finish_load(
        &self,
        owner: &str,
        ticket: LoadTicket,
        result: Result<Vec<E>>,
        policy: LoadFailurePolicy,
    ) -> Result<bool> {
        let mut state = self.lock_state();
        if state.epoch != ticket.epoch || state.owner.as_deref() != Some(owner) {
            tracing::debug!("Discarding stale {} load for {}", E::KIND, owner);
            return Ok(false);
        }

        let outcome = match result {
            Ok(mut items) => {
                items.sort_by(E::display_order);
                tracing::debug!("Loaded {} {} rows", items.len(), E::KIND);
                state.items = items;
                state.replay_since(ticket.seq);
                state.load = LoadState::Ready;
                Ok(true)
            }
            Err(e) => {
                tracing::error!("Failed to load {} rows: {}", E::KIND, e);
                if policy == LoadFailurePolicy::FailClear {
                    state.items.clear();
                }
                state.load = LoadState::Failed(e.to_string());
                Err(e)
            }
        };

        state.loads_in_flight = state.loads_in_flight.saturating_sub(1);
        if state.loads_in_flight == 0 {
            state.settled.clear();
        }
        outcome
    }

    /// Adds an entity confirmed by the remote side, if the collection still
    /// belongs to the epoch the write started in.
    pub fn place_confirmed(&self, entity: E, epoch: u64) -> bool {
        let mut state = self.lock_state();
        if state.epoch != epoch {
            return false;
        }
        let redo = Redo::Put(entity);
        redo.clone().replay(&mut state.items);
        state.record_settled(redo);
        true
    }

    /// Waits until no other mutation of `id` is in flight. Mutations of one
    /// entity run one at a time so each rollback restores the state that
    /// immediately preceded it.
    pub async fn lock_id(&self, id: Uuid) -> IdGuard<'_> {
        let lock = Arc::clone(lock_map(&self.id_locks).entry(id).or_default());
        IdGuard {
            locks: &self.id_locks,
            id,
            guard: Some(lock.lock_owned().await),
        }
    }

    #[cfg(test)]
    pub fn tracked_ids(&self) -> usize {
        lock_map(&self.id_locks).len()
    }
}

fn lock_map(locks: &IdLocks) -> MutexGuard<'_, HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>> {
    locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Holds the mutation lock of one id. The map entry goes away with the last
/// holder.
pub(crate) struct IdGuard<'a> {
    locks: &'a IdLocks,
    id: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for IdGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = lock_map(self.locks);
        if locks
            .get(&self.id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.id);
        }
    }
}
