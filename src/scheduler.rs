use crate::orchestrator::Orchestrator;
use crate::types::{PulseError, Result, TimeWindow, Trigger};
use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Recurring trigger definition. Immutable after process start; changing the
/// schedule requires a restart.
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub enabled: bool,
    pub day_of_week: Weekday,
    pub hour: u32,
    pub minute: u32,
    pub timezone: Tz,
    pub window_days: i64,
}

impl ScheduleConfig {
    /// Validates every field up front. An unrecognized timezone or day name
    /// is a configuration error here, never a silent fallback later.
    pub fn new(
        enabled: bool,
        day_of_week: &str,
        hour: u32,
        minute: u32,
        timezone: &str,
        window_days: i64,
    ) -> Result<Self> {
        let day = day_of_week
            .parse::<Weekday>()
            .map_err(|_| PulseError::Config(format!("unrecognized day of week: {day_of_week}")))?;
        if hour > 23 {
            return Err(PulseError::Config(format!("hour out of range: {hour}")));
        }
        if minute > 59 {
            return Err(PulseError::Config(format!("minute out of range: {minute}")));
        }
        let tz: Tz = timezone
            .parse()
            .map_err(|_| PulseError::Config(format!("unrecognized timezone: {timezone}")))?;
        if !Trigger::Scheduled.window_bounds().contains(&window_days) {
            return Err(PulseError::Config(format!(
                "scheduled window_days must be within {:?}, got {window_days}",
                Trigger::Scheduled.window_bounds()
            )));
        }
        Ok(Self {
            enabled,
            day_of_week: day,
            hour,
            minute,
            timezone: tz,
            window_days,
        })
    }

    pub fn describe(&self) -> String {
        format!("{} {:02}:{:02}", self.day_of_week, self.hour, self.minute)
    }
}

/// Next occurrence of the configured weekday/time strictly after `now`,
/// evaluated in the configured timezone.
///
/// Pure so it is unit-testable without timers. Returns `None` only when the
/// wall-clock time does not exist in the coming week (a DST gap on the
/// scheduled day).
pub fn next_fire_at(config: &ScheduleConfig, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let local_now = now.with_timezone(&config.timezone);
    let time = NaiveTime::from_hms_opt(config.hour, config.minute, 0)?;
    for days_ahead in 0..=7 {
        let date = local_now.date_naive() + ChronoDuration::days(days_ahead);
        if date.weekday() != config.day_of_week {
            continue;
        }
        let Some(candidate) = config
            .timezone
            .from_local_datetime(&date.and_time(time))
            .earliest()
        else {
            continue;
        };
        let candidate = candidate.with_timezone(&Utc);
        if candidate > now {
            return Some(candidate);
        }
    }
    None
}

/// Live scheduler state. Mutated only by the scheduler itself.
#[derive(Debug, Clone, Default)]
pub struct ScheduleState {
    pub is_running: bool,
    pub next_fire_at: Option<DateTime<Utc>>,
}

/// Status snapshot exposed to callers.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub enabled: bool,
    pub running: bool,
    pub schedule: String,
    pub timezone: String,
    pub next_fire_at: String,
}

/// Owns the recurring trigger: computes fire times, launches detached
/// orchestrations when due, and answers status queries without blocking on
/// in-flight work.
pub struct Scheduler {
    config: ScheduleConfig,
    orchestrator: Orchestrator,
    ceiling: Duration,
    state: Arc<RwLock<ScheduleState>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(config: ScheduleConfig, orchestrator: Orchestrator, ceiling: Duration) -> Self {
        Self {
            config,
            orchestrator,
            ceiling,
            state: Arc::new(RwLock::new(ScheduleState::default())),
            handle: Mutex::new(None),
        }
    }

    /// Start the background timer loop. A no-op when the schedule is disabled
    /// or the loop is already running.
    pub async fn start(&self) {
        if !self.config.enabled {
            info!("scheduler is disabled via configuration");
            return;
        }
        let mut handle = self.handle.lock().await;
        if handle.is_some() {
            warn!("scheduler is already running");
            return;
        }
        if let Some(next) = next_fire_at(&self.config, Utc::now()) {
            let mut st = self.state.write().await;
            st.is_running = true;
            st.next_fire_at = Some(next);
        }
        *handle = Some(tokio::spawn(run_loop(
            self.config.clone(),
            self.orchestrator.clone(),
            self.ceiling,
            self.state.clone(),
        )));
        info!(
            "scheduler started: {} ({})",
            self.config.describe(),
            self.config.timezone
        );
    }

    /// Stop the timer loop. In-flight orchestrations are detached tasks and
    /// keep running to their own ceiling.
    pub async fn stop(&self) {
        if let Some(handle) = self.handle.lock().await.take() {
            handle.abort();
            info!("scheduler stopped");
        }
        let mut st = self.state.write().await;
        st.is_running = false;
        st.next_fire_at = None;
    }

    pub async fn status(&self) -> SchedulerStatus {
        let st = self.state.read().await.clone();
        SchedulerStatus {
            enabled: self.config.enabled,
            running: st.is_running,
            schedule: self.config.describe(),
            timezone: self.config.timezone.to_string(),
            next_fire_at: st
                .next_fire_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "not scheduled".to_string()),
        }
    }
}

async fn run_loop(
    config: ScheduleConfig,
    orchestrator: Orchestrator,
    ceiling: Duration,
    state: Arc<RwLock<ScheduleState>>,
) {
    loop {
        let Some(next) = next_fire_at(&config, Utc::now()) else {
            warn!("no future occurrence for {}; scheduler going idle", config.describe());
            let mut st = state.write().await;
            st.is_running = false;
            st.next_fire_at = None;
            return;
        };
        {
            let mut st = state.write().await;
            st.is_running = true;
            st.next_fire_at = Some(next);
        }
        let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        tokio::time::sleep(wait).await;

        let window = match TimeWindow::trailing(Utc::now().date_naive(), config.window_days) {
            Ok(window) => window,
            Err(e) => {
                error!("skipping fire, bad window: {e}");
                continue;
            }
        };
        info!("schedule fired for window {window}; launching detached run");

        // Detached: the loop never waits on the run. Failures and timeouts
        // are logged by the spawned task; the next fire is computed
        // regardless of outcome. Each fire gets a fresh invocation.
        let run = orchestrator.clone();
        tokio::spawn(async move {
            match run
                .run_with_ceiling(window, None, Trigger::Scheduled, ceiling)
                .await
            {
                Ok(record) => info!(
                    "scheduled run {} finished with outcome {:?}",
                    record.run_id, record.outcome
                ),
                Err(e) => error!("scheduled run failed: {e}"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monday_8am_utc() -> ScheduleConfig {
        ScheduleConfig::new(true, "mon", 8, 0, "UTC", 7).unwrap()
    }

    #[test]
    fn next_fire_from_sunday_evening() {
        // Sunday 23:00 UTC -> next Monday 08:00 UTC, nine hours later.
        let now = Utc.with_ymd_and_hms(2025, 11, 23, 23, 0, 0).unwrap();
        let next = next_fire_at(&monday_8am_utc(), now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 11, 24, 8, 0, 0).unwrap());
        assert_eq!((next - now).num_hours(), 9);
    }

    #[test]
    fn next_fire_is_strictly_after_now() {
        // Exactly at the fire instant the next occurrence is a week out.
        let now = Utc.with_ymd_and_hms(2025, 11, 24, 8, 0, 0).unwrap();
        let next = next_fire_at(&monday_8am_utc(), now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 12, 1, 8, 0, 0).unwrap());
    }

    #[test]
    fn next_fire_respects_timezone() {
        // Monday 08:00 in Kolkata (UTC+5:30) is Monday 02:30 UTC.
        let config = ScheduleConfig::new(true, "mon", 8, 0, "Asia/Kolkata", 7).unwrap();
        let now = Utc.with_ymd_and_hms(2025, 11, 23, 23, 0, 0).unwrap();
        let next = next_fire_at(&config, now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 11, 24, 2, 30, 0).unwrap());
    }

    #[test]
    fn later_same_day_fire_is_found() {
        let now = Utc.with_ymd_and_hms(2025, 11, 24, 7, 59, 0).unwrap();
        let next = next_fire_at(&monday_8am_utc(), now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 11, 24, 8, 0, 0).unwrap());
    }

    #[test]
    fn construction_rejects_bad_timezone() {
        let err = ScheduleConfig::new(true, "mon", 8, 0, "Mars/Olympus", 7).unwrap_err();
        assert!(matches!(err, PulseError::Config(_)));
    }

    #[test]
    fn construction_rejects_bad_fields() {
        assert!(ScheduleConfig::new(true, "someday", 8, 0, "UTC", 7).is_err());
        assert!(ScheduleConfig::new(true, "mon", 24, 0, "UTC", 7).is_err());
        assert!(ScheduleConfig::new(true, "mon", 8, 60, "UTC", 7).is_err());
        assert!(ScheduleConfig::new(true, "mon", 8, 0, "UTC", 40).is_err());
        assert!(ScheduleConfig::new(true, "mon", 8, 0, "UTC", 6).is_err());
    }

    #[test]
    fn describe_is_human_readable() {
        assert_eq!(monday_8am_utc().describe(), "Mon 08:00");
    }
}
