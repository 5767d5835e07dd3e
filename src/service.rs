use crate::aggregator::{AggregateConfig, Aggregator};
use crate::classifier::{ClassifyConfig, LlmClassifier};
use crate::config::AppConfig;
use crate::fetcher::{FetchConfig, HttpReviewSource};
use crate::llm::GeminiClient;
use crate::mailer::{MockMailer, SmtpMailer};
use crate::orchestrator::Orchestrator;
use crate::scheduler::{Scheduler, SchedulerStatus};
use crate::store::ArtifactStore;
use crate::summarizer::LlmSummarizer;
use crate::traits::Mailer;
use crate::types::{PulseError, PulseReport, Result, RunRecord, Stage, TimeWindow, Trigger};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

/// Result of a manual run: the report plus the persisted artifact backing it.
#[derive(Debug)]
pub struct ManualRunOutput {
    pub report: PulseReport,
    pub pulse_artifact: String,
    pub record: RunRecord,
}

/// Facade consumed by the thin front end: status queries, manual runs and
/// artifact downloads.
pub struct PulseService {
    store: ArtifactStore,
    orchestrator: Orchestrator,
    scheduler: Scheduler,
    manual_ceiling: Duration,
}

impl PulseService {
    /// Wire the production collaborators from configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let store = ArtifactStore::new(&config.data_dir)?;
        let source = Arc::new(HttpReviewSource::new(
            config.reviews_url.clone(),
            FetchConfig::default(),
        )?);
        let classifier = Arc::new(LlmClassifier::new(
            GeminiClient::new(config.llm.clone())?,
            ClassifyConfig::default(),
        ));
        let summarizer = Arc::new(LlmSummarizer::new(GeminiClient::new(config.llm.clone())?));
        let mailer: Arc<dyn Mailer> = if config.mail.mock {
            Arc::new(MockMailer::new())
        } else {
            Arc::new(SmtpMailer::new(&config.mail)?)
        };
        let aggregator = Aggregator::new(summarizer, AggregateConfig::default());
        let orchestrator = Orchestrator::new(
            store.clone(),
            source,
            classifier,
            aggregator,
            mailer,
            config.mail.recipients.clone(),
        );
        let scheduler = Scheduler::new(
            config.schedule.clone(),
            orchestrator.clone(),
            config.scheduled_ceiling,
        );
        Ok(Self {
            store,
            orchestrator,
            scheduler,
            manual_ceiling: config.manual_ceiling,
        })
    }

    /// Wire from explicit parts. Used by tests and offline setups.
    pub fn with_parts(
        store: ArtifactStore,
        orchestrator: Orchestrator,
        scheduler: Scheduler,
        manual_ceiling: Duration,
    ) -> Self {
        Self {
            store,
            orchestrator,
            scheduler,
            manual_ceiling,
        }
    }

    pub async fn start_scheduler(&self) {
        self.scheduler.start().await;
    }

    pub async fn stop_scheduler(&self) {
        self.scheduler.stop().await;
    }

    pub async fn status(&self) -> SchedulerStatus {
        self.scheduler.status().await
    }

    /// Run the pipeline now for a trailing window ending today.
    pub async fn run_manual(
        &self,
        window_days: i64,
        recipient: Option<String>,
    ) -> Result<ManualRunOutput> {
        let window = TimeWindow::trailing(Utc::now().date_naive(), window_days)?;
        let record = self
            .orchestrator
            .run_with_ceiling(window, recipient, Trigger::Manual, self.manual_ceiling)
            .await?;
        let pulse_artifact = record
            .stage_artifact(Stage::Aggregate)
            .ok_or_else(|| PulseError::ArtifactNotFound {
                name: "pulse report".into(),
            })?
            .to_string();
        let report: PulseReport = self.store.read_json(&pulse_artifact)?;
        Ok(ManualRunOutput {
            report,
            pulse_artifact,
            record,
        })
    }

    /// Fetch a stored artifact by name. The name must match the artifact
    /// naming pattern; anything else is rejected before touching the
    /// filesystem.
    pub fn download_artifact(&self, name: &str) -> Result<Vec<u8>> {
        self.store.read_bytes(name)
    }
}
