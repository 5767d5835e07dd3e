mod common;

use common::{harness_with, static_source};
use review_pulse::{KeywordClassifier, PulseError, ScheduleConfig, Scheduler};
use std::sync::Arc;
use std::time::Duration;

fn scheduler_with(config: ScheduleConfig) -> Scheduler {
    let harness = harness_with(
        static_source(Vec::new()),
        Arc::new(KeywordClassifier::new()),
        vec!["team@example.com".to_string()],
    );
    Scheduler::new(config, harness.orchestrator, Duration::from_secs(1800))
}

#[tokio::test]
async fn enabled_scheduler_reports_running_with_a_next_fire_time() {
    let config = ScheduleConfig::new(true, "mon", 8, 0, "UTC", 7).unwrap();
    let scheduler = scheduler_with(config);

    let before = scheduler.status().await;
    assert!(before.enabled);
    assert!(!before.running);
    assert_eq!(before.next_fire_at, "not scheduled");

    scheduler.start().await;
    let status = scheduler.status().await;
    assert!(status.running);
    assert_eq!(status.schedule, "Mon 08:00");
    assert_eq!(status.timezone, "UTC");
    assert_ne!(status.next_fire_at, "not scheduled");

    scheduler.stop().await;
    let stopped = scheduler.status().await;
    assert!(!stopped.running);
    assert_eq!(stopped.next_fire_at, "not scheduled");
}

#[tokio::test]
async fn disabled_scheduler_start_is_a_no_op() {
    let config = ScheduleConfig::new(false, "mon", 8, 0, "UTC", 7).unwrap();
    let scheduler = scheduler_with(config);

    scheduler.start().await;
    let status = scheduler.status().await;
    assert!(!status.enabled);
    assert!(!status.running);
    assert_eq!(status.next_fire_at, "not scheduled");
}

#[tokio::test]
async fn status_is_callable_repeatedly_while_running() {
    let config = ScheduleConfig::new(true, "sun", 6, 30, "Asia/Kolkata", 14).unwrap();
    let scheduler = scheduler_with(config);
    scheduler.start().await;

    for _ in 0..10 {
        let status = scheduler.status().await;
        assert!(status.running);
        assert_eq!(status.timezone, "Asia/Kolkata");
    }

    scheduler.stop().await;
}

#[test]
fn malformed_timezone_fails_construction() {
    // Construction fails outright, so no scheduler exists to report itself
    // as running.
    let err = ScheduleConfig::new(true, "mon", 8, 0, "Not/AZone", 7).unwrap_err();
    assert!(matches!(err, PulseError::Config(_)));
}
