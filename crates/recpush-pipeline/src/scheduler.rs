//! Timer-driven dispatch of the composite workflow.
//!
//! The [`Scheduler`] owns one [`TaskDescriptor`] per [`TaskKind`]. A single
//! tick loop inspects them on a fixed interval and spawns the workflow for
//! any task that is due and not already running. The running flag is cleared
//! by a drop guard, so a failed or panicking workflow cannot wedge the task.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime, NaiveTime, TimeZone, Utc};
use recpush_core::{ScheduleConfig, ScheduleMode};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub const DEFAULT_INTERVAL_SECS: i64 = 1800;
pub const DEFAULT_CHECK_INTERVAL_SECS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    ProfileGenerationWorkflow,
}

impl TaskKind {
    pub const ALL: [TaskKind; 1] = [TaskKind::ProfileGenerationWorkflow];

    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            TaskKind::ProfileGenerationWorkflow => {
                "regenerate profiles, rebuild recommendations and push them"
            }
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::ProfileGenerationWorkflow => f.write_str("profile_generation_workflow"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskDescriptor {
    pub kind: TaskKind,
    pub last_run: Option<DateTime<Utc>>,
    /// `None` means the task was never scheduled and will not be dispatched.
    pub next_run: Option<DateTime<Utc>>,
    pub running: bool,
    pub description: String,
}

impl TaskDescriptor {
    fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.running && self.next_run.is_some_and(|next| now >= next)
    }
}

#[async_trait]
pub trait ScheduledWorkflow: Send + Sync + 'static {
    async fn run(&self, kind: TaskKind);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timing {
    Interval(chrono::Duration),
    Daily { hour: u32, minute: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub timing: Timing,
    pub check_interval: Duration,
}

impl SchedulerSettings {
    /// Resolve configured values, substituting defaults (with a warning) for
    /// non-positive intervals and out-of-range clock times.
    #[must_use]
    pub fn from_config(config: &ScheduleConfig) -> Self {
        let timing = match config.mode {
            ScheduleMode::Interval { interval_secs } => {
                let secs = if interval_secs > 0 {
                    interval_secs
                } else {
                    tracing::warn!(
                        interval_secs,
                        default = DEFAULT_INTERVAL_SECS,
                        "scheduler: non-positive interval replaced by default"
                    );
                    DEFAULT_INTERVAL_SECS
                };
                Timing::Interval(chrono::Duration::seconds(secs))
            }
            ScheduleMode::Daily { hour, minute } => Timing::Daily {
                hour: clock_value("hour", hour, 23, config.default_hour),
                minute: clock_value("minute", minute, 59, config.default_minute),
            },
        };

        let check_secs = if config.check_interval_secs > 0 {
            config.check_interval_secs
        } else {
            tracing::warn!(
                check_interval_secs = config.check_interval_secs,
                default = DEFAULT_CHECK_INTERVAL_SECS,
                "scheduler: non-positive check interval replaced by default"
            );
            DEFAULT_CHECK_INTERVAL_SECS
        };

        Self {
            timing,
            check_interval: Duration::from_secs(check_secs.unsigned_abs()),
        }
    }

    /// Next run time measured from `now`.
    #[must_use]
    pub fn next_run(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.timing {
            Timing::Interval(interval) => now + interval,
            Timing::Daily { hour, minute } => {
                next_daily_run(&now.with_timezone(&Local), hour, minute).with_timezone(&Utc)
            }
        }
    }
}

fn clock_value(field: &'static str, value: i64, max: u32, default: u32) -> u32 {
    match u32::try_from(value) {
        Ok(v) if v <= max => v,
        _ => {
            tracing::warn!(field, value, default, "scheduler: out-of-range time replaced by default");
            default
        }
    }
}

/// First `hour:minute` wall-clock time in `now`'s zone strictly after `now`.
#[must_use]
pub fn next_daily_run<Tz: TimeZone>(now: &DateTime<Tz>, hour: u32, minute: u32) -> DateTime<Tz> {
    let target = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN);
    let tz = now.timezone();
    let today = now.date_naive();

    let candidate = resolve_local(&tz, today.and_time(target));
    if candidate > *now {
        return candidate;
    }
    let tomorrow = today.succ_opt().unwrap_or(today);
    resolve_local(&tz, tomorrow.and_time(target))
}

/// Local times skipped by a DST jump are moved forward by the hour the jump
/// removed, landing on the same instant the pre-jump offset would give.
fn resolve_local<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| {
            tz.from_local_datetime(&(naive + chrono::Duration::hours(1)))
                .earliest()
        })
        .unwrap_or_else(|| tz.from_utc_datetime(&naive))
}

/// Source of the current time for the tick loop and task bookkeeping.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct Scheduler {
    settings: SchedulerSettings,
    workflow: Arc<dyn ScheduledWorkflow>,
    tasks: Mutex<HashMap<TaskKind, TaskDescriptor>>,
    clock: Clock,
}

impl Scheduler {
    /// Build a scheduler with every task scheduled relative to `now`.
    #[must_use]
    pub fn new(
        settings: SchedulerSettings,
        workflow: Arc<dyn ScheduledWorkflow>,
        now: DateTime<Utc>,
    ) -> Arc<Self> {
        Self::with_clock(settings, workflow, now, Arc::new(Utc::now))
    }

    fn with_clock(
        settings: SchedulerSettings,
        workflow: Arc<dyn ScheduledWorkflow>,
        now: DateTime<Utc>,
        clock: Clock,
    ) -> Arc<Self> {
        let next_run = settings.next_run(now);
        let tasks = TaskKind::ALL
            .into_iter()
            .map(|kind| {
                let descriptor = TaskDescriptor {
                    kind,
                    last_run: None,
                    next_run: Some(next_run),
                    running: false,
                    description: kind.description().to_string(),
                };
                (kind, descriptor)
            })
            .collect();

        tracing::info!(
            timing = ?settings.timing,
            check_interval_secs = settings.check_interval.as_secs(),
            next_run = %next_run,
            "scheduler: initialised"
        );

        Arc::new(Self {
            settings,
            workflow,
            tasks: Mutex::new(tasks),
            clock,
        })
    }

    /// Start the tick loop in the background.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        settings: SchedulerSettings,
        workflow: Arc<dyn ScheduledWorkflow>,
    ) -> SchedulerHandle {
        Self::start_with_clock(settings, workflow, Arc::new(Utc::now))
    }

    /// Like [`Scheduler::start`], reading the time from `clock`.
    pub fn start_with_clock(
        settings: SchedulerSettings,
        workflow: Arc<dyn ScheduledWorkflow>,
        clock: Clock,
    ) -> SchedulerHandle {
        let now = clock();
        let scheduler = Self::with_clock(settings, workflow, now, clock);
        let tick_loop = tokio::spawn(Arc::clone(&scheduler).run_loop());
        SchedulerHandle {
            scheduler,
            tick_loop,
        }
    }

    async fn run_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.settings.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            self.check_tasks((self.clock)());
        }
    }

    /// Dispatch every task that is due at `now`. Returns how many started.
    pub fn check_tasks(self: &Arc<Self>, now: DateTime<Utc>) -> usize {
        let due: Vec<TaskKind> = {
            let mut tasks = self.lock_tasks();
            tasks
                .values_mut()
                .filter(|task| task.is_due(now))
                .map(|task| {
                    task.running = true;
                    task.kind
                })
                .collect()
        };

        for &kind in &due {
            self.dispatch(kind);
        }
        due.len()
    }

    fn dispatch(self: &Arc<Self>, kind: TaskKind) {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            let _completion = Completion {
                scheduler: Arc::clone(&scheduler),
                kind,
            };
            tracing::info!(task = %kind, "scheduler: task started");

            let workflow = Arc::clone(&scheduler.workflow);
            if let Err(e) = tokio::spawn(async move { workflow.run(kind).await }).await {
                tracing::error!(task = %kind, error = %e, "scheduler: task crashed");
            }
        });
    }

    fn finish(&self, kind: TaskKind, now: DateTime<Utc>) {
        let next_run = self.settings.next_run(now);
        if let Some(task) = self.lock_tasks().get_mut(&kind) {
            task.running = false;
            task.last_run = Some(now);
            task.next_run = Some(next_run);
        }
        tracing::info!(task = %kind, next_run = %next_run, "scheduler: task finished");
    }

    /// Current state of every task.
    #[must_use]
    pub fn tasks(&self) -> Vec<TaskDescriptor> {
        let mut tasks: Vec<TaskDescriptor> = self.lock_tasks().values().cloned().collect();
        tasks.sort_by_key(|t| t.kind.to_string());
        tasks
    }

    fn lock_tasks(&self) -> MutexGuard<'_, HashMap<TaskKind, TaskDescriptor>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears the running flag when the dispatched task ends, however it ends.
struct Completion {
    scheduler: Arc<Scheduler>,
    kind: TaskKind,
}

impl Drop for Completion {
    fn drop(&mut self) {
        self.scheduler.finish(self.kind, (self.scheduler.clock)());
    }
}

/// Keeps the tick loop alive; dropping the handle does not stop it.
pub struct SchedulerHandle {
    scheduler: Arc<Scheduler>,
    tick_loop: JoinHandle<()>,
}

impl SchedulerHandle {
    #[must_use]
    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    #[must_use]
    pub fn tasks(&self) -> Vec<TaskDescriptor> {
        self.scheduler.tasks()
    }

    pub fn shutdown(self) {
        self.tick_loop.abort();
        tracing::info!("scheduler: stopped");
    }
}

#[cfg(test)]
#[path = "scheduler_test.rs"]
mod tests;
