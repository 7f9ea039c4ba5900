/// CrickLive — Commentary Engine
///
/// Dvoustupňový AI komentář nad MatchState:
///   1. statistický rozbor situace (analytik)
///   2. play-by-play komentář postavený na rozboru (komentátor)
/// Volá OpenAI-kompatibilní chat-completions API (Groq).
///
/// Konfigurace je explicitní a injektovaná — žádné procesní singletony,
/// API klíč žije jen v CommentaryConfig.

use anyhow::{bail, Context, Result};
use match_state::MatchState;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct CommentaryConfig {
    pub api_key:      String,
    pub base_url:     String,
    pub model:        String,
    pub timeout_secs: u64,
}

impl Default for CommentaryConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: "llama-3.3-70b-versatile".to_string(),
            timeout_secs: 30,
        }
    }
}

impl CommentaryConfig {
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var("GROQ_API_KEY").unwrap_or_default(),
            base_url: std::env::var("GROQ_API_URL")
                .unwrap_or_else(|_| "https://api.groq.com/openai/v1".to_string()),
            model: std::env::var("GROQ_MODEL")
                .unwrap_or_else(|_| "llama-3.3-70b-versatile".to_string()),
            timeout_secs: 30,
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}

// ── Wire typy (OpenAI-kompatibilní) ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role:    String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    model:    String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Výsledek jednoho commentary běhu nad jedním tickem.
#[derive(Debug, Clone, Serialize)]
pub struct MatchCommentary {
    pub match_id:       String,
    pub captured_at:    i64,
    pub model:          String,
    pub stats_analysis: String,
    pub commentary:     String,
}

const STATS_ANALYST_ROLE: &str = "\
You are an expert cricket statistician and analyst. Given one live match \
state record, produce a structured analysis covering: the current match \
situation and key statistics; exceptional batting performances (strike \
rates, milestones); notable bowling figures (economy, wicket-taking \
spells); partnership and run-rate trends; and any game-changing moment \
worth highlighting. Keep it factual and grounded in the provided data.";

const COMMENTATOR_ROLE: &str = "\
You are an elite cricket commentator known for vivid, insightful \
play-by-play commentary. Using the match state and the statistical \
analysis provided, write at least 250 words of rich live commentary: \
describe the immediate action, weave the statistics naturally into the \
narrative, use authentic cricket terminology, and vary the tone with the \
game situation. Do not simply repeat the analysis.";

pub struct CommentaryEngine {
    config: CommentaryConfig,
    http:   Client,
}

impl CommentaryEngine {
    pub fn new(config: CommentaryConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("create commentary HTTP client")?;
        Ok(Self { config, http })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(CommentaryConfig::from_env())
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Celý dvoustupňový běh: rozbor → komentář.
    pub async fn commentate(&self, state: &MatchState) -> Result<MatchCommentary> {
        let stats_analysis = self.analyze_stats(state).await?;
        let commentary = self.generate_commentary(state, &stats_analysis).await?;

        Ok(MatchCommentary {
            match_id: state.match_id.clone(),
            captured_at: state.captured_at,
            model: self.config.model.clone(),
            stats_analysis,
            commentary,
        })
    }

    pub async fn analyze_stats(&self, state: &MatchState) -> Result<String> {
        self.chat(STATS_ANALYST_ROLE, stats_prompt(state)).await
    }

    pub async fn generate_commentary(&self, state: &MatchState, analysis: &str) -> Result<String> {
        self.chat(COMMENTATOR_ROLE, commentary_prompt(state, analysis)).await
    }

    async fn chat(&self, system: &str, user: String) -> Result<String> {
        if !self.is_configured() {
            bail!("commentary API key not configured");
        }

        debug!("sending chat request to {}", self.config.base_url);

        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage { role: "system".to_string(), content: system.to_string() },
                ChatMessage { role: "user".to_string(), content: user },
            ],
            temperature: Some(0.7),
            max_tokens: Some(1024),
        };

        let url = format!("{}/chat/completions", self.config.base_url);
        let response = self.http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&request)
            .send()
            .await
            .context("chat request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("chat API error: {} - {}", status, body.chars().take(200).collect::<String>());
            bail!("chat API error: {status}");
        }

        let parsed: ChatResponse = response.json().await.context("chat response parse failed")?;
        match parsed.choices.into_iter().next() {
            Some(choice) => Ok(choice.message.content),
            None => bail!("chat response had no choices"),
        }
    }
}

pub fn stats_prompt(state: &MatchState) -> String {
    let state_json = serde_json::to_string_pretty(state).unwrap_or_else(|_| "{}".to_string());
    format!(
        "Analyze this live cricket match state ({} vs {}, score {}):\n\n{}",
        state.team_a,
        state.team_b,
        if state.score_text.is_empty() { "unknown" } else { &state.score_text },
        state_json
    )
}

pub fn commentary_prompt(state: &MatchState, analysis: &str) -> String {
    let state_json = serde_json::to_string_pretty(state).unwrap_or_else(|_| "{}".to_string());
    format!(
        "Match state:\n{}\n\nStatistical analysis:\n{}\n\nLatest update from the ground: {}\n\n\
         Now produce the live commentary.",
        state_json,
        analysis,
        if state.context_text.is_empty() { "none" } else { &state.context_text }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use match_state::{normalize, RawSnapshot};
    use serde_json::json;

    fn sample_state() -> MatchState {
        let raw = RawSnapshot::from_value(json!({
            "title": "India vs Pakistan",
            "livescore": "250/5",
            "update": "Wicket falls!",
            "batterone": "Kohli",
            "batsmanonerun": 82,
            "batsmanoneball": 60,
        }));
        normalize(&raw, "m1", 1000)
    }

    #[test]
    fn default_config_targets_groq() {
        let cfg = CommentaryConfig::default();
        assert_eq!(cfg.base_url, "https://api.groq.com/openai/v1");
        assert_eq!(cfg.model, "llama-3.3-70b-versatile");
        assert!(!cfg.is_configured());
    }

    #[test]
    fn stats_prompt_carries_the_match_state() {
        let prompt = stats_prompt(&sample_state());
        assert!(prompt.contains("India vs Pakistan"));
        assert!(prompt.contains("250/5"));
        assert!(prompt.contains("Kohli"));
    }

    #[test]
    fn commentary_prompt_embeds_the_analysis() {
        let prompt = commentary_prompt(&sample_state(), "Kohli is anchoring the chase.");
        assert!(prompt.contains("Kohli is anchoring the chase."));
        assert!(prompt.contains("Wicket falls!"));
    }

    #[test]
    fn optional_request_knobs_are_omitted_when_unset() {
        let request = ChatRequest {
            model: "m".to_string(),
            messages: vec![],
            temperature: None,
            max_tokens: None,
        };
        let wire = serde_json::to_string(&request).unwrap();
        assert!(!wire.contains("temperature"));
        assert!(!wire.contains("max_tokens"));
    }

    #[tokio::test]
    async fn unconfigured_engine_refuses_to_run() {
        let engine = CommentaryEngine::new(CommentaryConfig::default()).unwrap();
        let err = engine.commentate(&sample_state()).await.unwrap_err();
        assert!(err.to_string().contains("not configured"));
    }
}
