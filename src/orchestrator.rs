use crate::aggregator::Aggregator;
use crate::store::{
    ArtifactKey, ArtifactStore, PREFIX_CLASSIFIED, PREFIX_PULSE, PREFIX_REVIEWS, PREFIX_RUN,
    PREFIX_SEND_LOG, PREFIX_THEMES,
};
use crate::traits::{Classifier, Mailer, ReviewSource};
use crate::types::{
    ClassifiedReview, DeliveryStatus, PulseError, PulseReport, Result, Review, RunOutcome,
    RunRecord, Stage, ThemeSummary, TimeWindow, Trigger,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info, warn};

/// Fetch-stage artifact.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReviewsArtifact {
    pub window: TimeWindow,
    pub fetched_at: DateTime<Utc>,
    pub records: Vec<Review>,
}

/// Classify-stage artifact.
#[derive(Debug, Serialize, Deserialize)]
pub struct ClassifiedArtifact {
    pub window: TimeWindow,
    pub classified_at: DateTime<Utc>,
    pub fallback_count: usize,
    pub records: Vec<ClassifiedReview>,
}

/// Secondary aggregate-stage artifact: the full per-theme summaries.
#[derive(Debug, Serialize, Deserialize)]
pub struct ThemesArtifact {
    pub window: TimeWindow,
    pub summaries: Vec<ThemeSummary>,
}

struct RunProgress {
    key: ArtifactKey,
    record: RunRecord,
}

type SharedProgress = Arc<Mutex<Option<RunProgress>>>;

fn with_progress<R>(progress: &SharedProgress, f: impl FnOnce(&mut RunProgress) -> R) -> R {
    let mut guard = progress.lock().expect("progress mutex poisoned");
    f(guard.as_mut().expect("progress is initialized before stages run"))
}

/// Sequences the pipeline stages for one invocation and owns its RunRecord.
///
/// The struct itself is stateless between invocations: every `run` call is a
/// self-contained execution whose only side effects are artifact writes and
/// one RunRecord write. Cloning is cheap and yields a fresh invocation
/// handle over the same collaborators.
#[derive(Clone)]
pub struct Orchestrator {
    store: ArtifactStore,
    source: Arc<dyn ReviewSource>,
    classifier: Arc<dyn Classifier>,
    aggregator: Aggregator,
    mailer: Arc<dyn Mailer>,
    /// Configured default recipients; always included in deliveries.
    default_recipients: Vec<String>,
}

impl Orchestrator {
    pub fn new(
        store: ArtifactStore,
        source: Arc<dyn ReviewSource>,
        classifier: Arc<dyn Classifier>,
        aggregator: Aggregator,
        mailer: Arc<dyn Mailer>,
        default_recipients: Vec<String>,
    ) -> Self {
        Self {
            store,
            source,
            classifier,
            aggregator,
            mailer,
            default_recipients,
        }
    }

    /// Run the full stage sequence: Fetch -> Classify -> Aggregate -> Deliver.
    pub async fn run(
        &self,
        window: TimeWindow,
        recipient: Option<String>,
        trigger: Trigger,
    ) -> Result<RunRecord> {
        let progress: SharedProgress = Arc::new(Mutex::new(None));
        self.run_inner(window, recipient, trigger, progress).await
    }

    /// Like [`run`](Self::run) but bounded by a wall-clock ceiling.
    ///
    /// On timeout the in-flight stage is abandoned (its partial output, if
    /// any, is never referenced as usable), the RunRecord is finalized
    /// `failed` and persisted, and a timeout error attributed to that stage
    /// is returned.
    pub async fn run_with_ceiling(
        &self,
        window: TimeWindow,
        recipient: Option<String>,
        trigger: Trigger,
        ceiling: Duration,
    ) -> Result<RunRecord> {
        let progress: SharedProgress = Arc::new(Mutex::new(None));
        match tokio::time::timeout(
            ceiling,
            self.run_inner(window, recipient, trigger, progress.clone()),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                let mut guard = progress.lock().expect("progress mutex poisoned");
                let Some(mut p) = guard.take() else {
                    return Err(PulseError::Timeout { stage: Stage::Fetch });
                };
                let stage = p.record.stage_in_flight().unwrap_or(Stage::Fetch);
                p.record
                    .fail_stage(stage, &format!("run exceeded {}s ceiling", ceiling.as_secs()));
                p.record.finalize(RunOutcome::Failed);
                error!(
                    "run {} timed out after {}s during stage {stage}",
                    p.record.run_id,
                    ceiling.as_secs()
                );
                self.persist_run_record(&p.key, &p.record);
                Err(PulseError::Timeout { stage })
            }
        }
    }

    async fn run_inner(
        &self,
        window: TimeWindow,
        recipient: Option<String>,
        trigger: Trigger,
        progress: SharedProgress,
    ) -> Result<RunRecord> {
        // Fail fast on a bad window, before any record or artifact exists.
        let days = window.length_days();
        if !trigger.window_bounds().contains(&days) {
            warn!("rejecting {trigger} run: window of {days} days out of bounds");
            return Err(PulseError::Validation(format!(
                "window_days must be within {:?} for {trigger} runs, got {days}",
                trigger.window_bounds()
            )));
        }

        let started_at = Utc::now();
        let record = RunRecord::begin(trigger, window, started_at);
        let run_id = record.run_id;
        let key = ArtifactKey::new(trigger, window, started_at, run_id);
        info!("starting {trigger} run {run_id} for window {window}");
        *progress.lock().expect("progress mutex poisoned") = Some(RunProgress { key: key.clone(), record });

        // Each stage consumes its predecessor's artifact and writes its own;
        // a stage is never invoked after a failure.

        // Fetch
        with_progress(&progress, |p| p.record.start_stage(Stage::Fetch));
        info!("stage fetch: pulling reviews from {}", self.source.source_name());
        let fetched = match self.stage_fetch(&key, &window).await {
            Ok(count) => count,
            Err(e) => return self.abort(&progress, Stage::Fetch, e),
        };
        with_progress(&progress, |p| {
            p.record.complete_stage(Stage::Fetch, Some(key.name(PREFIX_REVIEWS)))
        });

        // Classify
        with_progress(&progress, |p| p.record.start_stage(Stage::Classify));
        info!("stage classify: {fetched} reviews");
        let classified = match self.stage_classify(&key).await {
            Ok(count) => count,
            Err(e) => return self.abort(&progress, Stage::Classify, e),
        };
        with_progress(&progress, |p| {
            p.record
                .complete_stage(Stage::Classify, Some(key.name(PREFIX_CLASSIFIED)))
        });

        // Aggregate
        with_progress(&progress, |p| p.record.start_stage(Stage::Aggregate));
        info!("stage aggregate: {classified} classified reviews");
        if let Err(e) = self.stage_aggregate(&key).await {
            return self.abort(&progress, Stage::Aggregate, e);
        }
        with_progress(&progress, |p| {
            p.record.complete_stage(Stage::Aggregate, Some(key.name(PREFIX_PULSE)))
        });

        // Deliver
        let recipients = self.resolve_recipients(trigger, recipient);
        if recipients.is_empty() {
            warn!("no recipients resolved; skipping delivery");
            let record = with_progress(&progress, |p| {
                p.record.finalize(RunOutcome::Partial);
                p.record.clone()
            });
            self.persist_run_record(&key, &record);
            return Ok(record);
        }
        with_progress(&progress, |p| p.record.start_stage(Stage::Deliver));
        info!("stage deliver: {} recipients", recipients.len());
        if let Err(e) = self.stage_deliver(&key, &recipients).await {
            return self.abort(&progress, Stage::Deliver, e);
        }
        with_progress(&progress, |p| {
            p.record
                .complete_stage(Stage::Deliver, Some(key.name(PREFIX_SEND_LOG)))
        });

        let record = with_progress(&progress, |p| {
            p.record.finalize(RunOutcome::Success);
            p.record.clone()
        });
        self.store.write_json(&key.name(PREFIX_RUN), &record)?;
        info!("run {run_id} completed successfully");
        Ok(record)
    }

    async fn stage_fetch(&self, key: &ArtifactKey, window: &TimeWindow) -> Result<usize> {
        let records = self.source.fetch(window).await?;
        let count = records.len();
        self.store.write_json(
            &key.name(PREFIX_REVIEWS),
            &ReviewsArtifact {
                window: *window,
                fetched_at: Utc::now(),
                records,
            },
        )?;
        Ok(count)
    }

    async fn stage_classify(&self, key: &ArtifactKey) -> Result<usize> {
        let input: ReviewsArtifact = self.store.read_json(&key.name(PREFIX_REVIEWS))?;
        let records = self.classifier.classify(&input.records).await?;
        let count = records.len();
        let fallback_count = records.iter().filter(|r| r.fallback_applied).count();
        self.store.write_json(
            &key.name(PREFIX_CLASSIFIED),
            &ClassifiedArtifact {
                window: input.window,
                classified_at: Utc::now(),
                fallback_count,
                records,
            },
        )?;
        Ok(count)
    }

    async fn stage_aggregate(&self, key: &ArtifactKey) -> Result<()> {
        let input: ClassifiedArtifact = self.store.read_json(&key.name(PREFIX_CLASSIFIED))?;
        let (summaries, report) = self.aggregator.aggregate(&input.window, &input.records).await?;
        self.store.write_json(
            &key.name(PREFIX_THEMES),
            &ThemesArtifact {
                window: input.window,
                summaries,
            },
        )?;
        self.store.write_json(&key.name(PREFIX_PULSE), &report)?;
        Ok(())
    }

    async fn stage_deliver(&self, key: &ArtifactKey, recipients: &[String]) -> Result<DeliveryStatus> {
        let report: PulseReport = self.store.read_json(&key.name(PREFIX_PULSE))?;
        let status = self.mailer.deliver(&report, recipients).await?;
        self.store.write_json(&key.name(PREFIX_SEND_LOG), &status)?;
        Ok(status)
    }

    /// Scheduled runs go to the configured defaults only; a manual caller's
    /// recipient is appended to the defaults, never substituted for them.
    fn resolve_recipients(&self, trigger: Trigger, recipient: Option<String>) -> Vec<String> {
        let mut recipients = self.default_recipients.clone();
        if trigger == Trigger::Manual {
            if let Some(extra) = recipient {
                let extra = extra.trim().to_string();
                if !extra.is_empty() && !recipients.contains(&extra) {
                    recipients.push(extra);
                }
            }
        }
        recipients
    }

    /// Mark the failed stage, finalize and persist the record, and surface a
    /// stage failure. Later stages are never invoked; artifacts of earlier
    /// successful stages stay on disk for inspection.
    fn abort(
        &self,
        progress: &SharedProgress,
        stage: Stage,
        err: PulseError,
    ) -> Result<RunRecord> {
        let (key, record) = with_progress(progress, |p| {
            p.record.fail_stage(stage, &err.to_string());
            p.record.finalize(RunOutcome::Failed);
            (p.key.clone(), p.record.clone())
        });
        error!("run {} failed at stage {stage}: {err}", record.run_id);
        self.persist_run_record(&key, &record);
        Err(PulseError::Stage {
            stage,
            message: err.to_string(),
        })
    }

    fn persist_run_record(&self, key: &ArtifactKey, record: &RunRecord) {
        if let Err(e) = self.store.write_json(&key.name(PREFIX_RUN), record) {
            error!("failed to persist run record {}: {e}", record.run_id);
        }
    }
}
