//! Optimistic mirrors of the remote collections.
//!
//! Every store keeps the signed-in user's rows in memory. Mutations are
//! applied locally first, then written remotely, and undone if the write
//! fails. Mutations of the same entity are serialized.

mod collection;
mod entity;
mod goals;
mod optimistic;
mod routines;
mod tasks;

pub use entity::EntityStore;
pub use goals::GoalStore;
pub use routines::RoutineStore;
pub use tasks::TaskStore;

use crate::models::Appointment;

pub type AppointmentStore = EntityStore<Appointment>;

/// Progress of the most recent load of a store.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoadState {
    /// Nothing requested yet, or signed out.
    #[default]
    Idle,
    Loading,
    Ready,
    Failed(String),
}

/// What a list view should show for a store.
#[derive(Debug, Clone, PartialEq)]
pub enum ListState<E> {
    Loading,
    Failed(String),
    Empty,
    Items(Vec<E>),
}
