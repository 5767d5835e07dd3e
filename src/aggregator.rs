use crate::traits::Summarizer;
use crate::types::{ClassifiedReview, PulseReport, Result, Theme, ThemeSummary, TimeWindow};
use std::cmp::Reverse;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct AggregateConfig {
    /// Reviews per summarization unit in the map stage.
    pub chunk_size: usize,
    /// Themes selected into the report.
    pub top_themes: usize,
    pub max_bullets_per_theme: usize,
    pub max_quotes_per_theme: usize,
    /// Quotes selected across themes for the report.
    pub max_quotes: usize,
    /// Hard narrative word bound.
    pub max_words: usize,
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            chunk_size: 20,
            top_themes: 3,
            max_bullets_per_theme: 8,
            max_quotes_per_theme: 10,
            max_quotes: 3,
            max_words: 250,
        }
    }
}

/// Map/reduce aggregation: per-chunk summarization, then cross-chunk merging
/// into a single bounded report.
#[derive(Clone)]
pub struct Aggregator {
    summarizer: Arc<dyn Summarizer>,
    config: AggregateConfig,
}

impl Aggregator {
    pub fn new(summarizer: Arc<dyn Summarizer>, config: AggregateConfig) -> Self {
        Self { summarizer, config }
    }

    /// Reduce classified reviews to theme summaries and the pulse report.
    ///
    /// Zero input reviews is a valid outcome: the report comes back with
    /// empty themes/quotes/actions and a narrative saying no data was
    /// available.
    pub async fn aggregate(
        &self,
        window: &TimeWindow,
        reviews: &[ClassifiedReview],
    ) -> Result<(Vec<ThemeSummary>, PulseReport)> {
        if reviews.is_empty() {
            info!("no classified reviews in {window}; producing empty report");
            return Ok((
                Vec::new(),
                PulseReport {
                    window: *window,
                    top_themes: Vec::new(),
                    quotes: Vec::new(),
                    action_ideas: Vec::new(),
                    narrative: format!("No review data was available for the window {window}."),
                },
            ));
        }

        // Group by theme in declaration order, then rank by count. The stable
        // sort keeps declaration order as the tie-break.
        let mut ranked: Vec<(Theme, Vec<&ClassifiedReview>)> = Theme::ALL
            .iter()
            .map(|&theme| {
                (
                    theme,
                    reviews.iter().filter(|r| r.theme == theme).collect::<Vec<_>>(),
                )
            })
            .filter(|(_, items)| !items.is_empty())
            .collect();
        ranked.sort_by_key(|(_, items)| Reverse(items.len()));

        let mut summaries = Vec::with_capacity(ranked.len());
        for (theme, items) in &ranked {
            summaries.push(self.map_theme(*theme, items).await?);
        }

        let top: Vec<ThemeSummary> = summaries
            .iter()
            .take(self.config.top_themes)
            .cloned()
            .collect();

        let quotes = self.select_quotes(&top, &ranked);
        let narrative = enforce_word_bound(
            &self.summarizer.narrate(window, &top).await?,
            self.config.max_words,
        );
        let action_ideas: Vec<String> = top.iter().map(action_idea).collect();

        info!(
            "aggregated {} reviews into {} theme summaries, {} selected",
            reviews.len(),
            summaries.len(),
            top.len()
        );

        Ok((
            summaries,
            PulseReport {
                window: *window,
                top_themes: top,
                quotes,
                action_ideas,
                narrative,
            },
        ))
    }

    /// Map stage for one theme: summarize fixed-size chunks, then merge,
    /// dedupe and cap the results.
    async fn map_theme(&self, theme: Theme, items: &[&ClassifiedReview]) -> Result<ThemeSummary> {
        let mut bullets = Vec::new();
        let mut quotes = Vec::new();
        let chunks = items.chunks(self.config.chunk_size.max(1));
        let chunk_count = chunks.len();

        for (idx, chunk) in chunks.enumerate() {
            debug!("map {theme}: chunk {}/{chunk_count}", idx + 1);
            let texts: Vec<String> = chunk.iter().map(|r| r.review.clean_text.clone()).collect();
            let summary = self.summarizer.summarize(theme, &texts).await?;
            bullets.extend(summary.bullets);
            quotes.extend(summary.quotes);
        }

        Ok(ThemeSummary {
            theme,
            review_count: items.len(),
            bullet_points: dedupe_cap(bullets, self.config.max_bullets_per_theme),
            representative_quotes: dedupe_cap(quotes, self.config.max_quotes_per_theme),
        })
    }

    /// Pick up to `max_quotes` quotes across the selected themes, preferring
    /// quotes backed by the highest-confidence classified reviews, then
    /// theme rank.
    fn select_quotes(
        &self,
        top: &[ThemeSummary],
        ranked: &[(Theme, Vec<&ClassifiedReview>)],
    ) -> Vec<String> {
        let mut candidates: Vec<(String, f64, usize, usize)> = Vec::new();
        for (theme_rank, summary) in top.iter().enumerate() {
            let items = ranked
                .iter()
                .find(|(theme, _)| *theme == summary.theme)
                .map(|(_, items)| items.as_slice())
                .unwrap_or(&[]);
            for (idx, quote) in summary.representative_quotes.iter().enumerate() {
                let confidence = backing_confidence(quote, items);
                candidates.push((quote.clone(), confidence, theme_rank, idx));
            }
        }

        candidates.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.2.cmp(&b.2))
                .then(a.3.cmp(&b.3))
        });

        let mut seen = HashSet::new();
        candidates
            .into_iter()
            .filter(|(quote, ..)| seen.insert(normalize_for_match(quote)))
            .take(self.config.max_quotes)
            .map(|(quote, ..)| quote)
            .collect()
    }
}

/// Highest confidence among reviews whose text contains the quote.
fn backing_confidence(quote: &str, items: &[&ClassifiedReview]) -> f64 {
    let needle = normalize_for_match(quote);
    if needle.is_empty() {
        return 0.0;
    }
    items
        .iter()
        .filter(|r| normalize_for_match(&r.review.clean_text).contains(&needle))
        .map(|r| r.confidence)
        .fold(0.0, f64::max)
}

/// One action idea per selected theme.
fn action_idea(summary: &ThemeSummary) -> String {
    match summary.bullet_points.first() {
        Some(bullet) => format!("{} (top signal: {bullet})", summary.theme.action_stem()),
        None => format!("{}.", summary.theme.action_stem()),
    }
}

/// Deduplicate by near-exact text match (case and whitespace insensitive),
/// preserving first-seen order, and cap the result.
fn dedupe_cap(items: Vec<String>, cap: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for item in items {
        let key = normalize_for_match(&item);
        if key.is_empty() || !seen.insert(key) {
            continue;
        }
        out.push(item);
        if out.len() == cap {
            break;
        }
    }
    out
}

pub(crate) fn normalize_for_match(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Cap text at `max_words` by truncation. The bound is a hard invariant:
/// whatever the summarizer returns, the report never exceeds it.
pub(crate) fn enforce_word_bound(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        text.to_string()
    } else {
        words[..max_words].join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_bound_truncates_only_when_needed() {
        let short = "a few words";
        assert_eq!(enforce_word_bound(short, 250), short);

        let long = std::iter::repeat("word").take(300).collect::<Vec<_>>().join(" ");
        let bounded = enforce_word_bound(&long, 250);
        assert_eq!(bounded.split_whitespace().count(), 250);
    }

    #[test]
    fn dedupe_is_near_exact_and_order_preserving() {
        let items = vec![
            "Money debited twice".to_string(),
            "  money   debited twice ".to_string(),
            "MONEY DEBITED TWICE!".to_string(),
            "Withdrawal stuck".to_string(),
        ];
        let deduped = dedupe_cap(items, 10);
        assert_eq!(deduped, vec!["Money debited twice", "Withdrawal stuck"]);
    }

    #[test]
    fn dedupe_caps_at_limit() {
        let items = (0..10).map(|i| format!("bullet {i}")).collect();
        assert_eq!(dedupe_cap(items, 4).len(), 4);
    }
}
