use crate::classifier::truncate_chars;
use crate::llm::{extract_json_object, GeminiClient};
use crate::traits::Summarizer;
use crate::types::{ChunkSummary, PulseError, Result, Theme, ThemeSummary, TimeWindow};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

/// LLM-backed summarizer for the map and reduce stages.
pub struct LlmSummarizer {
    llm: GeminiClient,
}

impl LlmSummarizer {
    pub fn new(llm: GeminiClient) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, theme: Theme, texts: &[String]) -> Result<ChunkSummary> {
        let prompt = map_prompt(theme, texts);
        let response = self.llm.generate(&prompt).await?;
        let body = extract_json_object(&response).ok_or_else(|| {
            PulseError::BadResponse("no JSON object in summarizer output".into())
        })?;
        let parsed: MapOutput = serde_json::from_str(body)?;
        debug!(
            "map chunk for {theme}: {} bullets, {} quotes",
            parsed.key_points.len(),
            parsed.candidate_quotes.len()
        );
        Ok(ChunkSummary {
            bullets: parsed.key_points,
            quotes: parsed.candidate_quotes,
        })
    }

    async fn narrate(&self, window: &TimeWindow, summaries: &[ThemeSummary]) -> Result<String> {
        let prompt = reduce_prompt(window, summaries)?;
        let response = self.llm.generate(&prompt).await?;
        Ok(response.trim().to_string())
    }
}

#[derive(Debug, Deserialize)]
struct MapOutput {
    #[serde(default)]
    key_points: Vec<String>,
    #[serde(default)]
    candidate_quotes: Vec<String>,
}

fn map_prompt(theme: Theme, texts: &[String]) -> String {
    let reviews = texts
        .iter()
        .map(|t| format!("- {}", truncate_chars(t, 200)))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "You are summarizing user feedback about a trading and investing app.\n\n\
Theme: {theme}\n\
Reviews (already cleaned, no direct PII):\n{reviews}\n\n\
Tasks:\n\
1. Extract 3-5 key points about this theme in a neutral, factual tone.\n\
2. Identify up to 3 short, vivid quotes that capture the sentiment. Do not \
include names, usernames, emails, or IDs.\n\
3. Return ONLY valid JSON in this format:\n\
{{\"theme\": \"{theme}\", \"key_points\": [\"...\"], \"candidate_quotes\": [\"...\"]}}\n\
Keep everything concise. Avoid marketing fluff."
    )
}

fn reduce_prompt(window: &TimeWindow, summaries: &[ThemeSummary]) -> Result<String> {
    let themes_json = serde_json::to_string_pretty(summaries)?;
    Ok(format!(
        "You are a product manager writing an app review pulse for an investing \
and trading app.\n\
Time window: {window}\n\n\
Top themes with summaries:\n{themes_json}\n\n\
Write a bullet-heavy, scannable note covering what users are saying per theme.\n\
Constraints:\n\
- Maximum 250 words total.\n\
- Short sentences, no marketing language.\n\
- No names, usernames, emails, or IDs.\n\
- Do not invent features; stay on the given key points.\n\
Return ONLY the note text, no JSON, no code fences."
    ))
}

/// Deterministic summarizer for tests and offline runs.
///
/// Bullets and quotes are derived mechanically from the input texts; the
/// narrative is a fixed template unless overridden.
pub struct MockSummarizer {
    narrative: Option<String>,
}

impl MockSummarizer {
    pub fn new() -> Self {
        Self { narrative: None }
    }

    /// Use a fixed narrative regardless of input. Lets tests feed an
    /// over-long narrative through the word bound.
    pub fn with_narrative(narrative: impl Into<String>) -> Self {
        Self {
            narrative: Some(narrative.into()),
        }
    }
}

impl Default for MockSummarizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Summarizer for MockSummarizer {
    async fn summarize(&self, theme: Theme, texts: &[String]) -> Result<ChunkSummary> {
        let bullets = texts
            .iter()
            .take(3)
            .map(|t| format!("{theme}: {}", truncate_chars(t, 80)))
            .collect();
        let quotes = texts
            .iter()
            .take(2)
            .map(|t| truncate_chars(t, 60).to_string())
            .collect();
        Ok(ChunkSummary { bullets, quotes })
    }

    async fn narrate(&self, window: &TimeWindow, summaries: &[ThemeSummary]) -> Result<String> {
        if let Some(narrative) = &self.narrative {
            return Ok(narrative.clone());
        }
        let themes = summaries
            .iter()
            .map(|s| format!("{} ({} reviews)", s.theme, s.review_count))
            .collect::<Vec<_>>()
            .join(", ");
        Ok(format!(
            "Review pulse for {window}. Leading themes: {themes}."
        ))
    }
}
