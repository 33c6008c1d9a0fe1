use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use uuid::Uuid;

use crate::ai::{GeminiGenerator, Suggester, TextGenerator};
use crate::analytics::{goal_progress, GoalProgress};
use crate::config::{Config, LoadFailurePolicy};
use crate::error::{AppError, Result};
use crate::models::Principal;
use crate::pomodoro::Pomodoro;
use crate::prefs::Preferences;
use crate::quotes::random_quote;
use crate::remote::{RemoteDataService, RestDataService};
use crate::session::{AccessToken, AuthBackend, RestAuthBackend, SessionManager};
use crate::store::{AppointmentStore, GoalStore, LoadState, RoutineStore, TaskStore};

/// The collections loaded for every session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Tasks,
    Routines,
    Templates,
    Appointments,
    Goals,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Tasks,
        EntityKind::Routines,
        EntityKind::Templates,
        EntityKind::Appointments,
        EntityKind::Goals,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Tasks => "tasks",
            Self::Routines => "routines",
            Self::Templates => "templates",
            Self::Appointments => "appointments",
            Self::Goals => "goals",
        }
    }
}

/// Load state of every collection after a session change.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LoadReport {
    pub states: Vec<(EntityKind, LoadState)>,
}

impl LoadReport {
    /// True once every collection has loaded.
    pub fn is_ready(&self) -> bool {
        !self.states.is_empty() && self.states.iter().all(|(_, s)| *s == LoadState::Ready)
    }

    pub fn failed(&self) -> Vec<EntityKind> {
        self.states
            .iter()
            .filter(|(_, s)| matches!(s, LoadState::Failed(_)))
            .map(|(kind, _)| *kind)
            .collect()
    }

    pub fn state(&self, kind: EntityKind) -> Option<&LoadState> {
        self.states.iter().find(|(k, _)| *k == kind).map(|(_, s)| s)
    }
}

pub struct App {
    session: SessionManager,
    pub tasks: TaskStore,
    pub routines: RoutineStore,
    pub appointments: AppointmentStore,
    pub goals: GoalStore,

    pub prefs: Preferences,
    prefs_path: PathBuf,
    pub quote: &'static str,
    pub pomodoro: Pomodoro,
}

impl App {
    /// Connects to the configured backend. Fails with `NotConfigured` when
    /// the backend URL or key is missing.
    pub fn new(config: &Config) -> Result<Self> {
        let (url, key) = config.backend()?;
        let timeout = Duration::from_secs(config.request_timeout_secs);

        let token = AccessToken::default();
        let remote = Arc::new(RestDataService::new(url, key, token.clone(), timeout)?);
        let auth = Arc::new(RestAuthBackend::new(url, key, token, timeout)?);

        let generator = match config.gemini_api_key.as_deref().map(str::trim) {
            Some(api_key) if !api_key.is_empty() => {
                let generator: Arc<dyn TextGenerator> =
                    Arc::new(GeminiGenerator::new(api_key.to_string(), timeout)?);
                Some(generator)
            }
            _ => {
                tracing::info!("No Gemini API key configured, suggestions are disabled");
                None
            }
        };

        let mut app = Self::with_services(remote, auth, generator, config.load_failure_policy);
        app.use_preferences_at(Preferences::prefs_path());
        Ok(app)
    }

    pub fn with_services(
        remote: Arc<dyn RemoteDataService>,
        auth: Arc<dyn AuthBackend>,
        generator: Option<Arc<dyn TextGenerator>>,
        policy: LoadFailurePolicy,
    ) -> Self {
        let suggester = Suggester::new(generator);
        Self {
            session: SessionManager::new(auth),
            tasks: TaskStore::new(remote.clone(), suggester.clone(), policy),
            routines: RoutineStore::new(remote.clone(), suggester, policy),
            appointments: AppointmentStore::new(remote.clone(), policy),
            goals: GoalStore::new(remote, policy),
            prefs: Preferences::default(),
            prefs_path: Preferences::prefs_path(),
            quote: random_quote(),
            pomodoro: Pomodoro::new(),
        }
    }

    /// Reads preferences from `path` and saves them there from now on. An
    /// unreadable file is replaced by defaults.
    pub fn use_preferences_at(&mut self, path: PathBuf) {
        self.prefs = Preferences::load_from(&path).unwrap_or_else(|e| {
            tracing::warn!("Failed to read preferences from {}: {}", path.display(), e);
            Preferences::default()
        });
        self.prefs_path = path;
    }

    pub fn toggle_dark_mode(&mut self) -> Result<bool> {
        self.prefs.toggle_dark_mode(&self.prefs_path)
    }

    pub fn principal(&self) -> Option<Principal> {
        self.session.current()
    }

    /// Observes the signed-in principal. Every identity change goes through
    /// `sign_in` or `sign_out`, which rescope the stores before returning.
    pub fn subscribe(&self) -> watch::Receiver<Option<Principal>> {
        self.session.subscribe()
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<LoadReport> {
        let principal = self.session.sign_in(email, password).await?;
        Ok(self.apply_identity(Some(&principal.id)).await)
    }

    /// Clears every store whether or not the backend acknowledged the
    /// sign-out.
    pub async fn sign_out(&self) {
        if let Err(e) = self.session.sign_out().await {
            tracing::debug!("Sign-out error ignored: {}", e);
        }
        self.apply_identity(None).await;
    }

    pub async fn sign_up(&self, email: &str, password: &str, display_name: &str) -> Result<()> {
        Ok(self.session.sign_up(email, password, display_name).await?)
    }

    pub async fn request_password_reset(&self, email: &str) -> Result<()> {
        Ok(self.session.request_password_reset(email).await?)
    }

    /// Renames the signed-in user. The owner id stays, so the stores keep
    /// their rows.
    pub async fn update_profile(&self, display_name: &str) -> Result<Principal> {
        Ok(self.session.update_profile(display_name).await?)
    }

    pub async fn update_password(&self, new_password: &str) -> Result<()> {
        Ok(self.session.update_password(new_password).await?)
    }

    /// Scopes every store to `owner` and loads all collections concurrently.
    /// One collection failing does not keep the others from loading.
    async fn apply_identity(&self, owner: Option<&str>) -> LoadReport {
        self.tasks.reset(owner);
        self.routines.reset(owner);
        self.appointments.reset(owner);
        self.goals.reset(owner);

        let Some(owner) = owner else {
            return LoadReport::default();
        };

        let (tasks, routines, templates, appointments, goals) = tokio::join!(
            self.tasks.load_all(owner),
            self.routines.load_all(owner),
            self.routines.templates().load_all(owner),
            self.appointments.load_all(owner),
            self.goals.load_all(owner),
        );
        let results = [
            (EntityKind::Tasks, tasks),
            (EntityKind::Routines, routines),
            (EntityKind::Templates, templates),
            (EntityKind::Appointments, appointments),
            (EntityKind::Goals, goals),
        ];
        for (kind, result) in results {
            if let Err(e) = result {
                tracing::warn!("Loading {} failed, retry is available: {}", kind.label(), e);
            }
        }

        let report = self.load_report();
        if report.is_ready() {
            tracing::debug!("All collections loaded for {}", owner);
        }
        report
    }

    pub fn load_state(&self, kind: EntityKind) -> LoadState {
        match kind {
            EntityKind::Tasks => self.tasks.load_state(),
            EntityKind::Routines => self.routines.load_state(),
            EntityKind::Templates => self.routines.templates().load_state(),
            EntityKind::Appointments => self.appointments.load_state(),
            EntityKind::Goals => self.goals.load_state(),
        }
    }

    pub fn load_report(&self) -> LoadReport {
        LoadReport {
            states: EntityKind::ALL
                .iter()
                .map(|kind| (*kind, self.load_state(*kind)))
                .collect(),
        }
    }

    /// Reloads one collection for the signed-in user.
    pub async fn retry(&self, kind: EntityKind) -> Result<()> {
        let owner = self.principal().ok_or(AppError::NoSession)?.id;
        match kind {
            EntityKind::Tasks => self.tasks.load_all(&owner).await,
            EntityKind::Routines => self.routines.load_all(&owner).await,
            EntityKind::Templates => self.routines.templates().load_all(&owner).await,
            EntityKind::Appointments => self.appointments.load_all(&owner).await,
            EntityKind::Goals => self.goals.load_all(&owner).await,
        }
    }

    /// Retries every collection whose last load failed, concurrently.
    pub async fn retry_failed(&self) -> LoadReport {
        let failed = self.load_report().failed();
        let results = join_all(failed.iter().map(|kind| self.retry(*kind))).await;
        for (kind, result) in failed.iter().zip(results) {
            if let Err(e) = result {
                tracing::warn!("Retrying {} failed: {}", kind.label(), e);
            }
        }
        self.load_report()
    }

    pub fn goal_progress(&self, goal_id: Uuid) -> Option<GoalProgress> {
        let goal = self.goals.get(goal_id)?;
        Some(goal_progress(&goal, &self.tasks.items()))
    }
}
