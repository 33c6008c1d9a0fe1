use std::fmt;
use std::time::Duration;

pub const FOCUS_DURATION: Duration = Duration::from_secs(25 * 60);
pub const SHORT_BREAK_DURATION: Duration = Duration::from_secs(5 * 60);
pub const LONG_BREAK_DURATION: Duration = Duration::from_secs(15 * 60);
pub const SESSIONS_UNTIL_LONG_BREAK: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Focus,
    ShortBreak,
    LongBreak,
}

impl Mode {
    pub fn duration(&self) -> Duration {
        match self {
            Self::Focus => FOCUS_DURATION,
            Self::ShortBreak => SHORT_BREAK_DURATION,
            Self::LongBreak => LONG_BREAK_DURATION,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Focus => "Focus",
            Self::ShortBreak => "Short break",
            Self::LongBreak => "Long break",
        }
    }
}

/// Tick-driven pomodoro timer. The caller feeds elapsed time; the timer
/// moves to the next phase when one runs out and stops there.
#[derive(Debug, Clone)]
pub struct Pomodoro {
    mode: Mode,
    remaining: Duration,
    running: bool,
    completed_sessions: u32,
}

impl Default for Pomodoro {
    fn default() -> Self {
        Self::new()
    }
}

impl Pomodoro {
    pub fn new() -> Self {
        Self {
            mode: Mode::Focus,
            remaining: FOCUS_DURATION,
            running: false,
            completed_sessions: 0,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn remaining(&self) -> Duration {
        self.remaining
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn completed_sessions(&self) -> u32 {
        self.completed_sessions
    }

    pub fn toggle(&mut self) {
        self.running = !self.running;
    }

    /// Restarts the current phase without running it.
    pub fn reset(&mut self) {
        self.running = false;
        self.remaining = self.mode.duration();
    }

    pub fn switch_mode(&mut self, mode: Mode) {
        self.mode = mode;
        self.reset();
    }

    /// Fraction of the current phase already elapsed, from 0.0 to 1.0.
    pub fn progress(&self) -> f64 {
        let total = self.mode.duration().as_secs_f64();
        if total == 0.0 {
            return 0.0;
        }
        (total - self.remaining.as_secs_f64()) / total
    }

    /// Advances the clock. Returns the phase that just finished, if any.
    pub fn tick(&mut self, elapsed: Duration) -> Option<Mode> {
        if !self.running {
            return None;
        }

        self.remaining = self.remaining.saturating_sub(elapsed);
        if !self.remaining.is_zero() {
            return None;
        }

        let finished = self.mode;
        let next = match finished {
            Mode::Focus => {
                self.completed_sessions += 1;
                if self.completed_sessions % SESSIONS_UNTIL_LONG_BREAK == 0 {
                    Mode::LongBreak
                } else {
                    Mode::ShortBreak
                }
            }
            Mode::ShortBreak | Mode::LongBreak => Mode::Focus,
        };
        tracing::debug!("{} finished, next up: {}", finished.label(), next.label());
        self.switch_mode(next);
        Some(finished)
    }
}

impl fmt::Display for Pomodoro {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.remaining.as_secs();
        write!(f, "{:02}:{:02}", secs / 60, secs % 60)
    }
}
