pub mod ai;
pub mod analytics;
pub mod app;
pub mod config;
pub mod error;
pub mod models;
pub mod pomodoro;
pub mod prefs;
pub mod quotes;
pub mod remote;
pub mod session;
pub mod store;

pub use app::{App, EntityKind, LoadReport};
pub use config::{Config, LoadFailurePolicy};
pub use error::{AppError, AuthError, Result};
