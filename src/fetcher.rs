use crate::traits::ReviewSource;
use crate::types::{Result, Review, TimeWindow};
use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use chrono::NaiveDate;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "review-pulse/0.1".to_string(),
            timeout_seconds: 30,
            max_retries: 3,
            retry_delay_seconds: 2,
        }
    }
}

/// Review source backed by an HTTP listing endpoint returning JSON.
///
/// Transport failures are retried with exponential backoff; an empty result
/// set is returned as-is, never treated as an error.
pub struct HttpReviewSource {
    client: reqwest::Client,
    url: String,
    config: FetchConfig,
}

impl HttpReviewSource {
    pub fn new(url: String, config: FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .build()?;
        Ok(Self {
            client,
            url,
            config,
        })
    }

    async fn fetch_payload(&self, window: &TimeWindow) -> Result<Vec<RawReview>> {
        let mut backoff = ExponentialBackoff {
            initial_interval: Duration::from_secs(self.config.retry_delay_seconds),
            max_interval: Duration::from_secs(self.config.retry_delay_seconds * 16),
            max_elapsed_time: Some(Duration::from_secs(self.config.retry_delay_seconds * 60)),
            ..ExponentialBackoff::default()
        };
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            let result = self
                .client
                .get(&self.url)
                .query(&[
                    ("start_date", window.start_date.to_string()),
                    ("end_date", window.end_date.to_string()),
                ])
                .send()
                .await
                .and_then(|r| r.error_for_status());

            match result {
                Ok(response) => {
                    let payload: ReviewsPayload = response.json().await?;
                    return Ok(payload.into_records());
                }
                Err(e) => {
                    last_error = Some(e);
                    if attempt < self.config.max_retries {
                        if let Some(delay) = backoff.next_backoff() {
                            warn!(
                                "review fetch attempt {} failed, retrying in {:?}",
                                attempt + 1,
                                delay
                            );
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
            }
        }

        Err(last_error.expect("at least one attempt was made").into())
    }
}

#[async_trait]
impl ReviewSource for HttpReviewSource {
    fn source_name(&self) -> String {
        format!("http ({})", self.url)
    }

    async fn fetch(&self, window: &TimeWindow) -> Result<Vec<Review>> {
        let raw = self.fetch_payload(window).await?;
        let total = raw.len();
        let reviews = normalize_reviews(raw, window);
        info!(
            "fetched {total} reviews, kept {} after relevance and window filtering",
            reviews.len()
        );
        Ok(reviews)
    }
}

/// Accepts both a bare array and the `{"records": [...]}` envelope.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ReviewsPayload {
    Wrapped { records: Vec<RawReview> },
    Bare(Vec<RawReview>),
}

impl ReviewsPayload {
    fn into_records(self) -> Vec<RawReview> {
        match self {
            ReviewsPayload::Wrapped { records } => records,
            ReviewsPayload::Bare(records) => records,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawReview {
    id: String,
    date: String,
    text: String,
    #[serde(default)]
    thumbs_up: i64,
}

fn normalize_reviews(raw: Vec<RawReview>, window: &TimeWindow) -> Vec<Review> {
    let mut reviews = Vec::new();
    for record in raw {
        if record.thumbs_up <= 0 {
            continue;
        }
        let Some(date) = parse_review_date(&record.date) else {
            debug!("dropping review {} with unparseable date {:?}", record.id, record.date);
            continue;
        };
        if !window.contains(date) {
            continue;
        }
        let clean_text = normalize_text(&record.text);
        if clean_text.is_empty() {
            continue;
        }
        reviews.push(Review {
            id: record.id,
            date,
            raw_text: record.text,
            clean_text,
            relevance: record.thumbs_up,
        });
    }
    reviews
}

fn parse_review_date(value: &str) -> Option<NaiveDate> {
    let prefix = value.get(..10)?;
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
}

/// Collapse whitespace and strip control characters.
pub(crate) fn normalize_text(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// In-memory source for wiring tests and offline runs.
pub struct StaticReviewSource {
    reviews: Vec<Review>,
}

impl StaticReviewSource {
    pub fn new(reviews: Vec<Review>) -> Self {
        Self { reviews }
    }
}

#[async_trait]
impl ReviewSource for StaticReviewSource {
    fn source_name(&self) -> String {
        "static".to_string()
    }

    async fn fetch(&self, window: &TimeWindow) -> Result<Vec<Review>> {
        Ok(self
            .reviews
            .iter()
            .filter(|r| window.contains(r.date))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn window() -> TimeWindow {
        TimeWindow::trailing(NaiveDate::from_ymd_opt(2025, 11, 27).unwrap(), 28).unwrap()
    }

    fn raw(id: &str, date: &str, text: &str, thumbs_up: i64) -> RawReview {
        RawReview {
            id: id.to_string(),
            date: date.to_string(),
            text: text.to_string(),
            thumbs_up,
        }
    }

    #[test]
    fn normalization_filters_relevance_window_and_empty_text() {
        let raw = vec![
            raw("r1", "2025-11-20", "App keeps  crashing\non order placement", 4),
            raw("r2", "2025-11-20", "ignored", 0),
            raw("r3", "2025-01-01", "outside the window", 9),
            raw("r4", "2025-11-20", "   \t ", 2),
            raw("r5", "not-a-date", "bad date", 2),
        ];
        let reviews = normalize_reviews(raw, &window());
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].id, "r1");
        assert_eq!(reviews[0].clean_text, "App keeps crashing on order placement");
    }

    #[test]
    fn date_parsing_accepts_datetime_strings() {
        assert_eq!(
            parse_review_date("2025-11-20T09:15:00Z"),
            NaiveDate::from_ymd_opt(2025, 11, 20)
        );
        assert_eq!(parse_review_date("nope"), None);
    }
}
