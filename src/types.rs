use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The contiguous date range one pipeline run analyzes.
///
/// The window is half-open on the left: a review dated `start_date` itself is
/// outside the window, everything in `(start_date, end_date]` is inside. That
/// keeps `end_date - start_date` equal to the configured number of days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl TimeWindow {
    /// Build the window ending at `end_date` and reaching `window_days` back.
    pub fn trailing(end_date: NaiveDate, window_days: i64) -> Result<Self> {
        if window_days < 1 {
            return Err(PulseError::Validation(format!(
                "window_days must be positive, got {window_days}"
            )));
        }
        Ok(Self {
            start_date: end_date - Duration::days(window_days),
            end_date,
        })
    }

    pub fn length_days(&self) -> i64 {
        (self.end_date - self.start_date).num_days()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date > self.start_date && date <= self.end_date
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} to {}", self.start_date, self.end_date)
    }
}

/// What caused a run: a caller or the background timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    Manual,
    Scheduled,
}

impl Trigger {
    /// Allowed `window_days` range for this trigger.
    pub fn window_bounds(&self) -> std::ops::RangeInclusive<i64> {
        match self {
            Trigger::Manual => 7..=56,
            Trigger::Scheduled => 7..=35,
        }
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trigger::Manual => write!(f, "manual"),
            Trigger::Scheduled => write!(f, "scheduled"),
        }
    }
}

/// The fixed theme set reviews are classified into.
///
/// Declaration order is significant twice over: it is the precedence order for
/// keyword fallback classification, and the tie-break order when ranking
/// themes with equal review counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Theme {
    #[serde(rename = "Execution & Performance")]
    ExecutionPerformance,
    #[serde(rename = "Payments & Withdrawals")]
    PaymentsWithdrawals,
    #[serde(rename = "Charges & Transparency")]
    ChargesTransparency,
    #[serde(rename = "KYC & Access")]
    KycAccess,
    #[serde(rename = "UI & Feature Gaps")]
    UiFeatureGaps,
}

impl Theme {
    pub const ALL: [Theme; 5] = [
        Theme::ExecutionPerformance,
        Theme::PaymentsWithdrawals,
        Theme::ChargesTransparency,
        Theme::KycAccess,
        Theme::UiFeatureGaps,
    ];

    /// Substituted when no classification signal is usable.
    pub const DEFAULT: Theme = Theme::UiFeatureGaps;

    pub fn label(&self) -> &'static str {
        match self {
            Theme::ExecutionPerformance => "Execution & Performance",
            Theme::PaymentsWithdrawals => "Payments & Withdrawals",
            Theme::ChargesTransparency => "Charges & Transparency",
            Theme::KycAccess => "KYC & Access",
            Theme::UiFeatureGaps => "UI & Feature Gaps",
        }
    }

    pub fn from_label(label: &str) -> Option<Theme> {
        Theme::ALL.iter().copied().find(|t| t.label() == label)
    }

    /// Keyword table used for fallback classification. Checked in declaration
    /// order; the first theme with a matching keyword wins.
    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            Theme::ExecutionPerformance => &[
                "execution", "pending", "order", "delay", "chart", "lag", "crash", "freeze",
                "stuck", "hang", "slow", "not updating", "ltp", "f&o", "strike", "option chain",
                "position", "not visible", "something went wrong", "error", "price not refreshing",
                "blocking", "buy-sell", "app lag", "app freeze", "app crash", "technical issue",
                "glitch", "bug", "not working",
            ],
            Theme::PaymentsWithdrawals => &[
                "payment", "debit", "money", "not reflected", "refund", "withdrawal",
                "taking days", "wallet", "balance", "incorrect", "decreasing", "settlement",
                "sale settlement", "auto-deduction", "unexplained", "charged",
            ],
            Theme::ChargesTransparency => &[
                "charge", "brokerage", "expensive", "cost", "fee", "hidden", "unexpected",
                "profit", "settled", "competitor", "scalper",
            ],
            Theme::KycAccess => &[
                "kyc", "aadhaar", "biometric", "verification", "incomplete",
                "investment", "renew", "registration", "loop", "account",
                "reactivate", "inactivity", "pan",
            ],
            Theme::UiFeatureGaps => &[
                "ui", "feature", "confusing", "oi", "etf", "stock", "tool", "fibonacci",
                "scalping", "watchlist", "statement", "unprofessional", "unformatted",
                "sip", "pause", "resume", "missing", "gap", "interface", "design",
            ],
        }
    }

    /// One-line product/process response used to derive action ideas.
    pub fn action_stem(&self) -> &'static str {
        match self {
            Theme::ExecutionPerformance => {
                "Stabilize order execution and app responsiveness during market hours"
            }
            Theme::PaymentsWithdrawals => {
                "Shorten payment and withdrawal settlement times and surface their status in-app"
            }
            Theme::ChargesTransparency => {
                "Publish a clear, upfront breakdown of charges and fees"
            }
            Theme::KycAccess => {
                "Streamline KYC verification and account reactivation flows"
            }
            Theme::UiFeatureGaps => {
                "Close the most-requested UI and feature gaps"
            }
        }
    }
}

impl std::fmt::Display for Theme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    pub fn parse(s: &str) -> Option<Sentiment> {
        match s.trim().to_lowercase().as_str() {
            "positive" => Some(Sentiment::Positive),
            "negative" => Some(Sentiment::Negative),
            "neutral" => Some(Sentiment::Neutral),
            _ => None,
        }
    }
}

/// One fetched review. Immutable once fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: String,
    pub date: NaiveDate,
    pub raw_text: String,
    pub clean_text: String,
    /// Thumbs-up count from the store listing; reviews with zero relevance
    /// are dropped at fetch time.
    pub relevance: i64,
}

/// A review plus its classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedReview {
    #[serde(flatten)]
    pub review: Review,
    pub theme: Theme,
    pub sentiment: Sentiment,
    pub confidence: f64,
    /// True whenever the low-confidence / invalid-theme fallback substituted
    /// the theme, so downstream consumers can weigh the label accordingly.
    pub fallback_applied: bool,
}

/// Merged map-stage output for one theme.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemeSummary {
    pub theme: Theme,
    pub review_count: usize,
    pub bullet_points: Vec<String>,
    pub representative_quotes: Vec<String>,
}

/// The bounded narrative report a run produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PulseReport {
    pub window: TimeWindow,
    pub top_themes: Vec<ThemeSummary>,
    pub quotes: Vec<String>,
    pub action_ideas: Vec<String>,
    pub narrative: String,
}

/// Bullets and verbatim quotes extracted from one chunk of reviews.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkSummary {
    pub bullets: Vec<String>,
    pub quotes: Vec<String>,
}

/// Outcome of a delivery attempt, persisted as the deliver-stage artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryStatus {
    pub recipients: Vec<String>,
    pub subject: String,
    pub mock: bool,
    pub sent_at: DateTime<Utc>,
}

/// One discrete pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Fetch,
    Classify,
    Aggregate,
    Deliver,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Fetch, Stage::Classify, Stage::Aggregate, Stage::Deliver];
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Fetch => write!(f, "fetch"),
            Stage::Classify => write!(f, "classify"),
            Stage::Aggregate => write!(f, "aggregate"),
            Stage::Deliver => write!(f, "deliver"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Succeeded,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub status: StageStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Primary artifact written by the stage, if it completed.
    pub artifact: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    Success,
    /// The report was produced but never delivered (no recipients configured).
    Partial,
    Failed,
}

/// The per-invocation run summary. Created when orchestration starts,
/// finalized exactly once, and persisted as its own artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub trigger: Trigger,
    pub window: TimeWindow,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub stages: Vec<StageRecord>,
    pub outcome: RunOutcome,
}

impl RunRecord {
    pub fn begin(trigger: Trigger, window: TimeWindow, started_at: DateTime<Utc>) -> Self {
        let stages = Stage::ALL
            .iter()
            .map(|&stage| StageRecord {
                stage,
                status: StageStatus::Skipped,
                started_at: None,
                finished_at: None,
                artifact: None,
                error: None,
            })
            .collect();
        Self {
            run_id: Uuid::new_v4(),
            trigger,
            window,
            started_at,
            finished_at: None,
            stages,
            outcome: RunOutcome::Failed,
        }
    }

    fn stage_mut(&mut self, stage: Stage) -> &mut StageRecord {
        self.stages
            .iter_mut()
            .find(|s| s.stage == stage)
            .expect("all stages are pre-registered")
    }

    pub fn start_stage(&mut self, stage: Stage) {
        let rec = self.stage_mut(stage);
        rec.started_at = Some(Utc::now());
    }

    pub fn complete_stage(&mut self, stage: Stage, artifact: Option<String>) {
        let rec = self.stage_mut(stage);
        rec.status = StageStatus::Succeeded;
        rec.finished_at = Some(Utc::now());
        rec.artifact = artifact;
    }

    pub fn fail_stage(&mut self, stage: Stage, error: &str) {
        let rec = self.stage_mut(stage);
        rec.status = StageStatus::Failed;
        rec.finished_at = Some(Utc::now());
        rec.error = Some(error.to_string());
    }

    /// The stage that has started but not finished, if any.
    pub fn stage_in_flight(&self) -> Option<Stage> {
        self.stages
            .iter()
            .find(|s| s.started_at.is_some() && s.finished_at.is_none())
            .map(|s| s.stage)
    }

    pub fn stage_artifact(&self, stage: Stage) -> Option<&str> {
        self.stages
            .iter()
            .find(|s| s.stage == stage)
            .and_then(|s| s.artifact.as_deref())
    }

    pub fn finalize(&mut self, outcome: RunOutcome) {
        self.outcome = outcome;
        self.finished_at = Some(Utc::now());
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PulseError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("stage {stage} failed: {message}")]
    Stage { stage: Stage, message: String },

    #[error("run timed out during stage {stage}")]
    Timeout { stage: Stage },

    #[error("artifact not found: {name}")]
    ArtifactNotFound { name: String },

    #[error("invalid artifact name: {name}")]
    InvalidArtifactName { name: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("mail message error: {0}")]
    MailMessage(#[from] lettre::error::Error),

    #[error("mail transport error: {0}")]
    MailTransport(#[from] lettre::transport::smtp::Error),

    #[error("unusable collaborator response: {0}")]
    BadResponse(String),
}

pub type Result<T> = std::result::Result<T, PulseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_length_matches_for_all_allowed_days() {
        let end = NaiveDate::from_ymd_opt(2025, 11, 27).unwrap();
        for days in 7..=56 {
            let window = TimeWindow::trailing(end, days).unwrap();
            assert_eq!(window.length_days(), days);
            assert!(window.start_date < window.end_date);
        }
    }

    #[test]
    fn window_rejects_non_positive_days() {
        let end = NaiveDate::from_ymd_opt(2025, 11, 27).unwrap();
        assert!(matches!(
            TimeWindow::trailing(end, 0),
            Err(PulseError::Validation(_))
        ));
    }

    #[test]
    fn window_contains_is_half_open() {
        let end = NaiveDate::from_ymd_opt(2025, 11, 27).unwrap();
        let window = TimeWindow::trailing(end, 7).unwrap();
        assert!(!window.contains(window.start_date));
        assert!(window.contains(window.start_date + Duration::days(1)));
        assert!(window.contains(window.end_date));
        assert!(!window.contains(window.end_date + Duration::days(1)));
    }

    #[test]
    fn theme_label_round_trips() {
        for theme in Theme::ALL {
            assert_eq!(Theme::from_label(theme.label()), Some(theme));
        }
        assert_eq!(Theme::from_label("Unknown Theme"), None);
    }

    #[test]
    fn run_record_tracks_in_flight_stage() {
        let window = TimeWindow::trailing(NaiveDate::from_ymd_opt(2025, 11, 27).unwrap(), 7).unwrap();
        let mut record = RunRecord::begin(Trigger::Manual, window, Utc::now());
        assert_eq!(record.stage_in_flight(), None);

        record.start_stage(Stage::Fetch);
        assert_eq!(record.stage_in_flight(), Some(Stage::Fetch));

        record.complete_stage(Stage::Fetch, Some("reviews_x.json".into()));
        assert_eq!(record.stage_in_flight(), None);

        record.start_stage(Stage::Classify);
        assert_eq!(record.stage_in_flight(), Some(Stage::Classify));
    }
}
