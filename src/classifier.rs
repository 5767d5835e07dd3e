use crate::llm::{extract_json_array, GeminiClient};
use crate::traits::Classifier;
use crate::types::{ClassifiedReview, Result, Review, Sentiment, Theme};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct ClassifyConfig {
    /// Reviews per LLM call.
    pub batch_size: usize,
    /// Below this the LLM result is replaced by the keyword fallback.
    pub confidence_threshold: f64,
    /// Confidence assigned to fallback classifications.
    pub fallback_confidence: f64,
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            confidence_threshold: 0.4,
            fallback_confidence: 0.45,
        }
    }
}

/// Keyword fallback: first theme in declaration (precedence) order with a
/// matching keyword wins; no match lands on the default theme.
pub fn classify_with_keywords(text: &str) -> Theme {
    let lower = text.to_lowercase();
    for theme in Theme::ALL {
        if theme.keywords().iter().any(|k| lower.contains(k)) {
            return theme;
        }
    }
    Theme::DEFAULT
}

/// LLM-backed classifier with keyword fallback.
///
/// Reviews are classified in batches; an unusable LLM result for a review
/// (invalid theme, low confidence, missing entry, or a failed call) falls
/// back to keyword matching. No review is ever dropped.
pub struct LlmClassifier {
    llm: GeminiClient,
    config: ClassifyConfig,
}

impl LlmClassifier {
    pub fn new(llm: GeminiClient, config: ClassifyConfig) -> Self {
        Self { llm, config }
    }

    async fn classify_batch(&self, batch: &[Review]) -> Vec<ClassifiedReview> {
        let llm_results = match self.call_llm(batch).await {
            Ok(results) => results,
            Err(e) => {
                warn!("LLM classification failed for batch of {}: {e}; using keyword fallback", batch.len());
                HashMap::new()
            }
        };

        batch
            .iter()
            .map(|review| self.resolve(review, llm_results.get(review.id.as_str())))
            .collect()
    }

    async fn call_llm(&self, batch: &[Review]) -> Result<HashMap<String, LlmClassification>> {
        let prompt = classify_prompt(batch);
        let response = self.llm.generate(&prompt).await?;
        let body = extract_json_array(&response).ok_or_else(|| {
            crate::types::PulseError::BadResponse("no JSON array in classifier output".into())
        })?;
        let parsed: Vec<LlmClassification> = serde_json::from_str(body)?;
        Ok(parsed
            .into_iter()
            .map(|c| (c.review_id.clone(), c))
            .collect())
    }

    fn resolve(&self, review: &Review, llm: Option<&LlmClassification>) -> ClassifiedReview {
        let sentiment = llm
            .and_then(|c| Sentiment::parse(&c.sentiment))
            .unwrap_or(Sentiment::Neutral);

        if let Some(c) = llm {
            if let Some(theme) = Theme::from_label(&c.theme) {
                if c.confidence >= self.config.confidence_threshold {
                    return ClassifiedReview {
                        review: review.clone(),
                        theme,
                        sentiment,
                        confidence: c.confidence.clamp(0.0, 1.0),
                        fallback_applied: false,
                    };
                }
            }
        }

        ClassifiedReview {
            review: review.clone(),
            theme: classify_with_keywords(&review.clean_text),
            sentiment,
            confidence: self.config.fallback_confidence,
            fallback_applied: true,
        }
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn classify(&self, reviews: &[Review]) -> Result<Vec<ClassifiedReview>> {
        let mut classified = Vec::with_capacity(reviews.len());
        for batch in reviews.chunks(self.config.batch_size.max(1)) {
            classified.extend(self.classify_batch(batch).await);
        }
        let fallbacks = classified.iter().filter(|c| c.fallback_applied).count();
        info!(
            "classified {} reviews ({fallbacks} via fallback)",
            classified.len()
        );
        Ok(classified)
    }
}

/// Offline classifier using only the keyword tables. Every result is marked
/// as a fallback so downstream consumers can tell it apart from LLM output.
pub struct KeywordClassifier {
    config: ClassifyConfig,
}

impl KeywordClassifier {
    pub fn new() -> Self {
        Self {
            config: ClassifyConfig::default(),
        }
    }
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Classifier for KeywordClassifier {
    async fn classify(&self, reviews: &[Review]) -> Result<Vec<ClassifiedReview>> {
        Ok(reviews
            .iter()
            .map(|review| ClassifiedReview {
                review: review.clone(),
                theme: classify_with_keywords(&review.clean_text),
                sentiment: Sentiment::Neutral,
                confidence: self.config.fallback_confidence,
                fallback_applied: true,
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct LlmClassification {
    review_id: String,
    #[serde(rename = "review_theme")]
    theme: String,
    #[serde(default)]
    sentiment: String,
    #[serde(default)]
    confidence: f64,
}

fn classify_prompt(batch: &[Review]) -> String {
    let themes = Theme::ALL
        .iter()
        .map(|t| format!("- {}", t.label()))
        .collect::<Vec<_>>()
        .join("\n");
    let precedence = Theme::ALL
        .iter()
        .map(|t| t.label())
        .collect::<Vec<_>>()
        .join(" > ");
    let reviews = json!(batch
        .iter()
        .map(|r| {
            json!({
                "review_id": r.id,
                "text": truncate_chars(&r.clean_text, 500),
            })
        })
        .collect::<Vec<_>>());

    format!(
        "You are a review classifier for a trading/investment app. Classify each \
review into exactly ONE theme and determine sentiment.\n\n\
Themes:\n{themes}\n\n\
Precedence if multiple signals match: {precedence}.\n\n\
Sentiment is one of: positive, negative, neutral.\n\n\
Return ONLY a valid JSON array, no prose or markdown. Each object must have:\n\
- review_id: from input\n\
- review_theme: one of the themes above\n\
- sentiment: positive, negative, or neutral\n\
- confidence: 0.0-1.0\n\n\
Reviews:\n{reviews}"
    )
}

pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
