use anyhow::Context;
use chrono::Utc;

use focus_planner::analytics::{completion_streak, overview, TimeWindow};
use focus_planner::store::ListState;
use focus_planner::{App, AppError, Config, EntityKind};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging (only show warnings and errors by default)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load().context("Failed to load configuration")?;

    let app = match App::new(&config) {
        Ok(app) => app,
        Err(AppError::NotConfigured(path)) => {
            eprintln!("Backend is not configured yet.");
            eprintln!("Set backend_url and backend_anon_key in {}", path);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let email = std::env::var("FOCUS_EMAIL").context("FOCUS_EMAIL is not set")?;
    let password = std::env::var("FOCUS_PASSWORD").context("FOCUS_PASSWORD is not set")?;

    let report = app
        .sign_in(&email, &password)
        .await
        .context("Sign-in failed")?;
    let report = if report.is_ready() {
        report
    } else {
        app.retry_failed().await
    };

    if let Some(principal) = app.principal() {
        println!("Signed in as {} <{}>", principal.display_name, principal.email);
    }
    println!("\"{}\"", app.quote);
    println!();

    for kind in EntityKind::ALL {
        if let Some(state) = report.state(kind) {
            println!("{:<14}{:?}", kind.label(), state);
        }
    }

    match app.tasks.list_state() {
        ListState::Items(tasks) => {
            let now = Utc::now();
            let week = overview(&tasks, TimeWindow::Week, now);
            println!();
            println!("Tasks this week: {}/{} completed", week.completed, week.total);
            println!("Streak: {} days", completion_streak(&tasks, now.date_naive()));
            for task in tasks.iter().filter(|t| !t.completed).take(10) {
                println!("  [{}] {}", task.priority.label(), task.text);
            }
        }
        ListState::Empty => println!("\nNo tasks yet"),
        ListState::Failed(message) => println!("\nTasks unavailable: {}", message),
        ListState::Loading => {}
    }

    let today = Utc::now().date_naive();
    let appointments: Vec<_> = app
        .appointments
        .items()
        .into_iter()
        .filter(|a| a.is_on(today))
        .collect();
    if !appointments.is_empty() {
        println!();
        println!("Today:");
        for appointment in appointments {
            println!("  {} {}", appointment.time.format("%H:%M"), appointment.text);
        }
    }

    for goal in app.goals.items() {
        if let Some(progress) = app.goal_progress(goal.id) {
            println!("Goal {}: {}%", goal.title, progress.rounded_percent());
        }
    }

    app.sign_out().await;
    Ok(())
}
