#![allow(dead_code)]

use chrono::{Duration, NaiveDate, Utc};
use review_pulse::{
    AggregateConfig, Aggregator, ArtifactStore, Classifier, MockMailer, MockSummarizer,
    Orchestrator, Review, ReviewSource, StaticReviewSource, TimeWindow,
};
use std::sync::Arc;

pub fn window_ending_today(days: i64) -> TimeWindow {
    TimeWindow::trailing(Utc::now().date_naive(), days).unwrap()
}

pub fn review(id: &str, date: NaiveDate, text: &str) -> Review {
    Review {
        id: id.to_string(),
        date,
        raw_text: text.to_string(),
        clean_text: text.to_string(),
        relevance: 3,
    }
}

/// A handful of reviews dated inside the window, one per theme keyword.
pub fn sample_reviews(window: &TimeWindow) -> Vec<Review> {
    let date = window.end_date - Duration::days(1);
    vec![
        review("r1", date, "app crash during order execution"),
        review("r2", date, "withdrawal taking days to settle"),
        review("r3", date, "kyc verification stuck for a week"),
        review("r4", date, "watchlist feature missing basic tools"),
    ]
}

pub struct TestHarness {
    pub store: ArtifactStore,
    pub mailer: Arc<MockMailer>,
    pub orchestrator: Orchestrator,
    _dir: tempfile::TempDir,
}

/// Orchestrator over an isolated store with mock summarization and delivery.
pub fn harness_with(
    source: Arc<dyn ReviewSource>,
    classifier: Arc<dyn Classifier>,
    recipients: Vec<String>,
) -> TestHarness {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path()).unwrap();
    let mailer = Arc::new(MockMailer::new());
    let aggregator = Aggregator::new(Arc::new(MockSummarizer::new()), AggregateConfig::default());
    let orchestrator = Orchestrator::new(
        store.clone(),
        source,
        classifier,
        aggregator,
        mailer.clone(),
        recipients,
    );
    TestHarness {
        store,
        mailer,
        orchestrator,
        _dir: dir,
    }
}

pub fn static_source(reviews: Vec<Review>) -> Arc<dyn ReviewSource> {
    Arc::new(StaticReviewSource::new(reviews))
}
