mod common;

use async_trait::async_trait;
use chrono::Duration;
use common::{review, window_ending_today};
use review_pulse::{
    AggregateConfig, Aggregator, ChunkSummary, ClassifiedReview, MockSummarizer, Result,
    Sentiment, Summarizer, Theme, ThemeSummary, TimeWindow,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn classified(
    window: &TimeWindow,
    id: &str,
    theme: Theme,
    confidence: f64,
    text: &str,
) -> ClassifiedReview {
    ClassifiedReview {
        review: review(id, window.end_date - Duration::days(1), text),
        theme,
        sentiment: Sentiment::Negative,
        confidence,
        fallback_applied: false,
    }
}

fn batch(window: &TimeWindow, theme: Theme, count: usize) -> Vec<ClassifiedReview> {
    (0..count)
        .map(|i| {
            classified(
                window,
                &format!("{theme}-{i}"),
                theme,
                0.8,
                &format!("{theme} complaint number {i}"),
            )
        })
        .collect()
}

fn aggregator(summarizer: Arc<dyn Summarizer>) -> Aggregator {
    Aggregator::new(summarizer, AggregateConfig::default())
}

#[tokio::test]
async fn empty_input_yields_a_valid_empty_report() {
    let window = window_ending_today(28);
    let (summaries, report) = aggregator(Arc::new(MockSummarizer::new()))
        .aggregate(&window, &[])
        .await
        .unwrap();

    assert!(summaries.is_empty());
    assert!(report.top_themes.is_empty());
    assert!(report.quotes.is_empty());
    assert!(report.action_ideas.is_empty());
    assert!(report.narrative.contains("No review data"));
}

#[tokio::test]
async fn top_themes_are_ranked_by_descending_count() {
    let window = window_ending_today(28);
    let mut reviews = Vec::new();
    reviews.extend(batch(&window, Theme::KycAccess, 61));
    reviews.extend(batch(&window, Theme::UiFeatureGaps, 58));
    reviews.extend(batch(&window, Theme::ExecutionPerformance, 21));
    reviews.extend(batch(&window, Theme::PaymentsWithdrawals, 19));
    reviews.extend(batch(&window, Theme::ChargesTransparency, 11));

    let (summaries, report) = aggregator(Arc::new(MockSummarizer::new()))
        .aggregate(&window, &reviews)
        .await
        .unwrap();

    assert_eq!(summaries.len(), 5);
    let top: Vec<(Theme, usize)> = report
        .top_themes
        .iter()
        .map(|s| (s.theme, s.review_count))
        .collect();
    assert_eq!(
        top,
        vec![
            (Theme::KycAccess, 61),
            (Theme::UiFeatureGaps, 58),
            (Theme::ExecutionPerformance, 21),
        ]
    );
}

#[tokio::test]
async fn equal_counts_break_ties_by_declared_theme_order() {
    let window = window_ending_today(28);
    let mut reviews = Vec::new();
    reviews.extend(batch(&window, Theme::KycAccess, 5));
    reviews.extend(batch(&window, Theme::ChargesTransparency, 5));
    reviews.extend(batch(&window, Theme::PaymentsWithdrawals, 5));
    reviews.extend(batch(&window, Theme::ExecutionPerformance, 2));
    reviews.extend(batch(&window, Theme::UiFeatureGaps, 1));

    let (_, report) = aggregator(Arc::new(MockSummarizer::new()))
        .aggregate(&window, &reviews)
        .await
        .unwrap();

    let top: Vec<Theme> = report.top_themes.iter().map(|s| s.theme).collect();
    assert_eq!(
        top,
        vec![
            Theme::PaymentsWithdrawals,
            Theme::ChargesTransparency,
            Theme::KycAccess,
        ]
    );
}

#[tokio::test]
async fn narrative_never_exceeds_the_word_bound() {
    let window = window_ending_today(28);
    let long_narrative = std::iter::repeat("word")
        .take(500)
        .collect::<Vec<_>>()
        .join(" ");
    let reviews = batch(&window, Theme::ExecutionPerformance, 4);

    let (_, report) = aggregator(Arc::new(MockSummarizer::with_narrative(long_narrative)))
        .aggregate(&window, &reviews)
        .await
        .unwrap();

    assert_eq!(report.narrative.split_whitespace().count(), 250);
}

/// Quotes each chunk's first review verbatim, so backing confidence is
/// reconstructible by the aggregator.
struct FirstTextSummarizer;

#[async_trait]
impl Summarizer for FirstTextSummarizer {
    async fn summarize(&self, theme: Theme, texts: &[String]) -> Result<ChunkSummary> {
        Ok(ChunkSummary {
            bullets: vec![format!("{theme} bullet")],
            quotes: texts.first().cloned().into_iter().collect(),
        })
    }

    async fn narrate(&self, _window: &TimeWindow, _summaries: &[ThemeSummary]) -> Result<String> {
        Ok("narrative".to_string())
    }
}

#[tokio::test]
async fn quote_selection_prefers_the_highest_confidence_reviews() {
    let window = window_ending_today(28);
    let mut reviews = vec![
        classified(&window, "p1", Theme::PaymentsWithdrawals, 0.6, "refund delayed by five days"),
        classified(&window, "p2", Theme::PaymentsWithdrawals, 0.6, "wallet balance wrong"),
        classified(&window, "p3", Theme::PaymentsWithdrawals, 0.6, "settlement very slow"),
    ];
    reviews.push(classified(
        &window,
        "e1",
        Theme::ExecutionPerformance,
        0.95,
        "orders stuck for minutes",
    ));

    let (_, report) = aggregator(Arc::new(FirstTextSummarizer))
        .aggregate(&window, &reviews)
        .await
        .unwrap();

    // Payments ranks first by count, but the execution quote is backed by a
    // higher-confidence review and wins the first slot.
    assert_eq!(report.quotes.first().map(String::as_str), Some("orders stuck for minutes"));
    assert!(report.quotes.contains(&"refund delayed by five days".to_string()));
}

#[tokio::test]
async fn action_ideas_are_one_to_one_with_top_themes() {
    let window = window_ending_today(28);
    let mut reviews = Vec::new();
    reviews.extend(batch(&window, Theme::ExecutionPerformance, 9));
    reviews.extend(batch(&window, Theme::KycAccess, 6));
    reviews.extend(batch(&window, Theme::UiFeatureGaps, 2));

    let (_, report) = aggregator(Arc::new(MockSummarizer::new()))
        .aggregate(&window, &reviews)
        .await
        .unwrap();

    assert_eq!(report.action_ideas.len(), report.top_themes.len());
    for (idea, summary) in report.action_ideas.iter().zip(&report.top_themes) {
        assert!(
            idea.starts_with(summary.theme.action_stem()),
            "idea {idea:?} should derive from {}",
            summary.theme
        );
    }
}

struct CountingSummarizer {
    calls: AtomicUsize,
}

#[async_trait]
impl Summarizer for CountingSummarizer {
    async fn summarize(&self, _theme: Theme, texts: &[String]) -> Result<ChunkSummary> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(texts.len() <= 20, "chunks must be bounded");
        Ok(ChunkSummary::default())
    }

    async fn narrate(&self, _window: &TimeWindow, _summaries: &[ThemeSummary]) -> Result<String> {
        Ok("narrative".to_string())
    }
}

#[tokio::test]
async fn map_stage_summarizes_in_bounded_chunks() {
    let window = window_ending_today(28);
    let summarizer = Arc::new(CountingSummarizer {
        calls: AtomicUsize::new(0),
    });
    let reviews = batch(&window, Theme::ExecutionPerformance, 45);

    aggregator(summarizer.clone())
        .aggregate(&window, &reviews)
        .await
        .unwrap();

    // 45 reviews with a chunk size of 20 -> 3 summarization units.
    assert_eq!(summarizer.calls.load(Ordering::SeqCst), 3);
}
