use crate::types::{
    ChunkSummary, ClassifiedReview, DeliveryStatus, PulseReport, Result, Review, Theme,
    ThemeSummary, TimeWindow,
};
use async_trait::async_trait;

/// Trait for fetching reviews from an upstream store listing.
///
/// An empty result set is a valid outcome; implementations only error on
/// transport failure.
#[async_trait]
pub trait ReviewSource: Send + Sync {
    /// Human-readable name for this source.
    fn source_name(&self) -> String;

    /// Fetch reviews falling inside the window.
    async fn fetch(&self, window: &TimeWindow) -> Result<Vec<Review>>;
}

/// Trait for classifying reviews into the fixed theme set.
///
/// Implementations must never drop an item: a low-confidence or unusable
/// result gets the fallback theme with `fallback_applied` set instead.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, reviews: &[Review]) -> Result<Vec<ClassifiedReview>>;
}

/// Trait for the text-generation collaborator behind the map/reduce stages.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Map stage: reduce one chunk of review texts for a theme to bullet
    /// points and a few verbatim quotes.
    async fn summarize(&self, theme: Theme, texts: &[String]) -> Result<ChunkSummary>;

    /// Reduce stage: produce the narrative note from the selected theme
    /// summaries. The word bound is enforced by the caller.
    async fn narrate(&self, window: &TimeWindow, summaries: &[ThemeSummary]) -> Result<String>;
}

/// Trait for delivering a finished report.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn deliver(&self, report: &PulseReport, recipients: &[String]) -> Result<DeliveryStatus>;
}
