/// CrickLive — Logger
/// JSONL event stream, NTFY push alerty

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

pub struct EventLogger {
    log_dir: PathBuf,
}

impl EventLogger {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        let dir = log_dir.into();
        fs::create_dir_all(&dir).ok();
        Self { log_dir: dir }
    }

    pub fn log<T: Serialize>(&self, event: &T) -> Result<()> {
        let date  = Utc::now().format("%Y-%m-%d").to_string();
        let path  = self.log_dir.join(format!("{date}.jsonl"));
        let line  = serde_json::to_string(event)?;
        let mut f = OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(f, "{line}")?;
        Ok(())
    }
}

pub fn now_iso() -> String {
    Utc::now().to_rfc3339()
}

// ── Event typy ────────────────────────────────────────────────────────────────

#[derive(Serialize, Debug)]
pub struct ApiStatusEvent {
    pub ts:           String,
    pub event:        &'static str,   // "API_STATUS"
    pub source:       String,         // "scorecard_api" | "live_scores_page"
    pub scope:        String,
    pub ok:           bool,
    pub status_code:  Option<u16>,
    pub message:      String,
    pub items_logged: usize,
}

#[derive(Serialize, Debug)]
pub struct MatchStateEvent {
    pub ts:               String,
    pub event:            &'static str,   // "MATCH_STATE"
    pub match_id:         String,
    pub captured_at:      i64,
    pub team_a:           String,
    pub team_b:           String,
    pub score_text:       String,
    pub runs_total:       u32,
    pub wicket_just_fell: bool,
}

#[derive(Serialize, Debug)]
pub struct WicketAlertEvent {
    pub ts:           String,
    pub event:        &'static str,   // "WICKET_ALERT"
    pub match_id:     String,
    pub team_a:       String,
    pub team_b:       String,
    pub score_text:   String,
    pub context_text: String,
}

#[derive(Serialize, Debug)]
pub struct CommentaryEvent {
    pub ts:               String,
    pub event:            &'static str,   // "COMMENTARY"
    pub match_id:         String,
    pub captured_at:      i64,
    pub model:            String,
    pub analysis_chars:   usize,
    pub commentary_chars: usize,
}

#[derive(Serialize, Debug)]
pub struct PipelineHeartbeatEvent {
    pub ts:                 String,
    pub event:              &'static str,   // "PIPELINE_HEARTBEAT"
    pub match_id:           String,
    pub poll_interval_secs: u64,
    pub ticks:              u64,
    pub states_appended:    u64,
    pub commentary_written: u64,
}

/// Pošli čitelný push alert (padlý wicket apod.)
pub async fn send_ntfy_alert(msg: &str, title: &str) {
    let topic_url = std::env::var("NTFY_TOPIC_URL")
        .unwrap_or_else(|_| "https://ntfy.sh/cricklive".to_string());
    let client = reqwest::Client::new();
    match client
        .post(&topic_url)
        .header("Title", title)
        .header("Priority", "high")
        .header("Tags", "cricket_game")
        .body(msg.to_string())
        .send()
        .await
    {
        Ok(_)  => tracing::info!("NTFY sent: {}", title),
        Err(e) => tracing::warn!("NTFY failed: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logs_one_jsonl_line_per_event() {
        let dir = std::env::temp_dir().join(format!("cricklive_logger_test_{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);

        let logger = EventLogger::new(&dir);
        let event = MatchStateEvent {
            ts: now_iso(),
            event: "MATCH_STATE",
            match_id: "m1".to_string(),
            captured_at: 1000,
            team_a: "India".to_string(),
            team_b: "Pakistan".to_string(),
            score_text: "250/5".to_string(),
            runs_total: 250,
            wicket_just_fell: true,
        };
        logger.log(&event).expect("event written");

        let date = Utc::now().format("%Y-%m-%d").to_string();
        let contents = fs::read_to_string(dir.join(format!("{date}.jsonl"))).expect("log file exists");
        let line = contents.lines().next().expect("one line");
        assert!(line.contains("\"MATCH_STATE\""));
        assert!(line.contains("\"runs_total\":250"));

        let _ = fs::remove_dir_all(&dir);
    }
}
