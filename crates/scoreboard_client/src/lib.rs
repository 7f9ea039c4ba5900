/// CrickLive — Scoreboard Client
///
/// Zdroje snapshotů pro pipeline:
/// - lokální scorecard API (companion server, GET /score?id=...)
/// - managed lifecycle companion serveru (attach / spawn / readiness / kill)
/// - match finder: scraping live-scores stránky (match ID + slug)
///
/// Hlásí zdraví zdrojů přes "API_STATUS" v Loggeru.

use anyhow::{bail, Context, Result};
use logger::{now_iso, ApiStatusEvent, EventLogger};
use match_state::RawSnapshot;
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::env;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{info, warn};

// ====================================================================
// Scorecard API client
// ====================================================================

pub struct ScoreboardClient {
    client:   reqwest::Client,
    base_url: String,
    logger:   EventLogger,
}

impl ScoreboardClient {
    pub fn new(base_url: impl Into<String>, log_dir: impl Into<std::path::PathBuf>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent("CrickLive/1.0")
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base_url: base_url.into(),
            logger: EventLogger::new(log_dir),
        }
    }

    /// Stáhni snapshot pro match_id. HTTP/parse chyba je Err — volající
    /// degraduje na prázdný snapshot, poll loop kvůli tomu nikdy nepadá.
    pub async fn fetch_snapshot(&self, match_id: &str) -> Result<RawSnapshot> {
        let url = format!("{}/score?id={}", self.base_url, match_id);
        let resp = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                self.log_status(false, None, &e.to_string(), 0);
                return Err(e).context("scorecard API request failed");
            }
        };

        let status = resp.status();
        if !status.is_success() {
            self.log_status(false, Some(status.as_u16()), &format!("http_{status}"), 0);
            bail!("scorecard API HTTP {status}");
        }

        let value: serde_json::Value = resp.json().await.context("scorecard API JSON parse failed")?;
        let snapshot = RawSnapshot::from_value(value);
        self.log_status(true, Some(200), "ok", usize::from(!snapshot.is_empty()));
        Ok(snapshot)
    }

    fn log_status(&self, ok: bool, status_code: Option<u16>, message: &str, items: usize) {
        let _ = self.logger.log(&ApiStatusEvent {
            ts: now_iso(),
            event: "API_STATUS",
            source: "scorecard_api".to_string(),
            scope: "cricket".to_string(),
            ok,
            status_code,
            message: message.to_string(),
            items_logged: items,
        });
    }
}

// ====================================================================
// Companion server lifecycle
// ====================================================================

#[derive(Debug, Clone)]
pub struct ScoreboardServerConfig {
    pub command:  String,
    pub args:     Vec<String>,
    pub workdir:  String,
    pub base_url: String,
    /// Kolikrát (1s apart) zkoušet readiness po spawnu
    pub readiness_attempts: u32,
}

impl Default for ScoreboardServerConfig {
    fn default() -> Self {
        Self {
            command: "flask".to_string(),
            args: ["--app", "index.py", "run", "--host=0.0.0.0", "--port=5000"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            workdir: "cricket-api/api".to_string(),
            base_url: "http://127.0.0.1:5000".to_string(),
            readiness_attempts: 30,
        }
    }
}

impl ScoreboardServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            command: env::var("SCOREBOARD_CMD").unwrap_or(defaults.command),
            args: env::var("SCOREBOARD_ARGS")
                .map(|raw| raw.split_whitespace().map(str::to_string).collect())
                .unwrap_or(defaults.args),
            workdir: env::var("SCOREBOARD_WORKDIR").unwrap_or(defaults.workdir),
            base_url: env::var("SCOREBOARD_URL").unwrap_or(defaults.base_url),
            readiness_attempts: env::var("SCOREBOARD_READY_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(defaults.readiness_attempts),
        }
    }
}

/// Managed lifecycle companion scorecard serveru.
///
/// Pokud už na base_url něco odpovídá, jen se připojíme (externí instance);
/// jinak spawn + bounded readiness poll. Vlastněný proces je zabit při
/// `shutdown()` i při dropu (kill_on_drop).
pub struct ScoreboardServer {
    config: ScoreboardServerConfig,
    probe:  reqwest::Client,
    child:  Option<Child>,
}

impl ScoreboardServer {
    pub fn new(config: ScoreboardServerConfig) -> Self {
        Self {
            probe: reqwest::Client::builder()
                .timeout(Duration::from_secs(2))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            config,
            child: None,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    pub async fn start(&mut self) -> Result<()> {
        if self.is_ready().await {
            info!("scoreboard server already running at {}", self.config.base_url);
            return Ok(());
        }

        info!(
            "starting scoreboard server: {} {} (cwd: {})",
            self.config.command,
            self.config.args.join(" "),
            self.config.workdir
        );
        let child = Command::new(&self.config.command)
            .args(&self.config.args)
            .current_dir(&self.config.workdir)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .context("spawn scoreboard server")?;
        self.child = Some(child);

        for attempt in 1..=self.config.readiness_attempts {
            if self.is_ready().await {
                info!("scoreboard server ready after {attempt} attempt(s)");
                return Ok(());
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        self.shutdown().await;
        bail!(
            "scoreboard server not ready after {} attempts",
            self.config.readiness_attempts
        )
    }

    async fn is_ready(&self) -> bool {
        match self.probe.get(&self.config.base_url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    /// Garantovaný teardown vlastněného procesu. No-op v attach módu.
    pub async fn shutdown(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.start_kill() {
                warn!("scoreboard server kill failed: {}", e);
            }
            let _ = child.wait().await;
            info!("scoreboard server terminated");
        }
    }
}

// ====================================================================
// Live match finder (HTML scraping)
// ====================================================================

#[derive(Debug, Clone)]
pub struct LiveMatchListing {
    pub id:    String,
    pub slug:  String,
    pub title: String,
}

pub struct MatchFinder {
    client:   reqwest::Client,
    live_url: String,
    logger:   EventLogger,
}

impl Default for MatchFinder {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchFinder {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                // Imitujeme prohlížeč kvůli anti-bot ochraně na parsovaném webu
                .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36")
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            live_url: env::var("CRICKET_LIVE_URL")
                .unwrap_or_else(|_| "https://www.cricbuzz.com/cricket-match/live-scores".to_string()),
            logger: EventLogger::new("logs"),
        }
    }

    pub async fn fetch_live_matches(&self) -> Result<Vec<LiveMatchListing>> {
        let resp = self.client.get(&self.live_url).send().await.context("live-scores request failed")?;

        let status = resp.status();
        if !status.is_success() {
            self.log_status(false, Some(status.as_u16()), &format!("http_{status}"), 0);
            bail!("live-scores page HTTP {status}");
        }

        let html = resp.text().await?;
        let listings = parse_live_listings(&html);
        self.log_status(true, Some(200), "ok", listings.len());
        info!("found {} live matches", listings.len());
        Ok(listings)
    }

    fn log_status(&self, ok: bool, status_code: Option<u16>, message: &str, items: usize) {
        let _ = self.logger.log(&ApiStatusEvent {
            ts: now_iso(),
            event: "API_STATUS",
            source: "live_scores_page".to_string(),
            scope: "cricket".to_string(),
            ok,
            status_code,
            message: message.to_string(),
            items_logged: items,
        });
    }
}

/// Vytáhne match ID + slug z anchorů typu /live-cricket-scores/<id>/<slug>.
/// Dedup podle ID — stejný zápas bývá na stránce nalinkovaný vícekrát.
pub fn parse_live_listings(html: &str) -> Vec<LiveMatchListing> {
    let document = Html::parse_document(html);
    let anchor_selector = Selector::parse("a[href]").unwrap();
    let href_re = Regex::new(r"/live-cricket-scores/(\d+)(?:/([a-z0-9-]+))?").unwrap();

    let mut seen = HashSet::new();
    let mut listings = Vec::new();

    for node in document.select(&anchor_selector) {
        let Some(href) = node.value().attr("href") else { continue };
        let Some(caps) = href_re.captures(href) else { continue };

        let id = caps[1].to_string();
        if !seen.insert(id.clone()) {
            continue;
        }

        let slug = caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default();
        let title = slug.replace('-', " ");
        listings.push(LiveMatchListing { id, slug, title });
    }

    listings
}
