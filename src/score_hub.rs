//! score-hub — WS ingest pro externí scoreboard feedy
//!
//! Cíl: přijímat realtime JSON snapshoty (browser userscript / companion
//! scraper), prohnat je sdíleným normalizerem a držet „poslední stav
//! zápasu" + audit log. Read-only HTTP endpoint pro náhled stavu.
//!
//! Spuštění:
//!   SCORE_HUB_BIND=0.0.0.0:8090 cargo run --bin score-hub
//!
//! Feeder (příklad):
//!   const ws = new WebSocket('ws://10.0.0.5:8090/feed');
//!   ws.send(JSON.stringify({v:1, type:'snapshot', source:'userscript',
//!                           match_id:'107563', payload:{...}}))

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use logger::EventLogger;
use match_state::{normalize, MatchState, RawSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::sync::RwLock;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, EnvFilter};
use unicode_normalization::UnicodeNormalization;

mod match_db;
use match_db::{
    spawn_db_writer,
    DbConfig,
    DbHeartbeatRow,
    DbIngestRow,
    DbMsg,
    DbStateRow,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HubMessageType {
    Snapshot,
    Heartbeat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotEnvelope {
    pub v: u32,
    #[serde(rename = "type")]
    pub msg_type: HubMessageType,
    pub source: String,
    /// Stabilní ID zápasu; bez něj se klíčuje podle názvů týmů
    pub match_id: Option<String>,
    pub ts: Option<String>,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone)]
struct TrackedMatch {
    source: String,
    seen_at: DateTime<Utc>,
    state: MatchState,
}

#[derive(Debug, Clone, Serialize)]
struct HubIngestEvent {
    ts: String,
    event: &'static str, // "HUB_INGEST"
    source: String,
    msg_type: String,
    ok: bool,
    note: String,
}

#[derive(Debug, Clone, Serialize)]
struct HubHeartbeatEvent {
    ts: String,
    event: &'static str, // "SCORE_HUB_HEARTBEAT"
    connections: usize,
    tracked_matches: usize,
    wickets_live: usize,
}

#[derive(Clone)]
struct ScoreHubState {
    matches: Arc<RwLock<HashMap<String, TrackedMatch>>>,
    connections: Arc<RwLock<usize>>,
}

impl ScoreHubState {
    fn new() -> Self {
        Self {
            matches: Arc::new(RwLock::new(HashMap::new())),
            connections: Arc::new(RwLock::new(0)),
        }
    }
}

fn normalize_name(name: &str) -> String {
    // NFKD + vyhodit combining marks, ať „São" i „Łódź" dají ascii klíč
    name.nfkd()
        .filter(|c| !unicode_normalization::char::is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn match_key(explicit_id: Option<&str>, state: &MatchState) -> String {
    match explicit_id {
        Some(id) if !id.trim().is_empty() => id.trim().to_string(),
        _ => format!(
            "cricket::{}_vs_{}",
            normalize_name(&state.team_a),
            normalize_name(&state.team_b)
        ),
    }
}

fn parse_ts(ts: &Option<String>) -> DateTime<Utc> {
    ts.as_ref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

#[derive(Debug, Clone, Serialize)]
struct HttpMatchItem {
    match_key: String,
    source: String,
    seen_at: String,
    state: MatchState,
}

#[derive(Debug, Clone, Serialize)]
struct HttpStateResponse {
    ts: String,
    connections: usize,
    tracked_matches: usize,
    wickets_live: usize,
    matches: Vec<HttpMatchItem>,
}

async fn build_state_snapshot(state: &ScoreHubState) -> HttpStateResponse {
    let connections = *state.connections.read().await;
    let matches_map = state.matches.read().await;

    let tracked_matches = matches_map.len();
    let wickets_live = matches_map
        .values()
        .filter(|m| m.state.wicket_just_fell)
        .count();

    let mut matches = Vec::new();
    for (k, v) in matches_map.iter() {
        matches.push(HttpMatchItem {
            match_key: k.clone(),
            source: v.source.clone(),
            seen_at: v.seen_at.to_rfc3339(),
            state: v.state.clone(),
        });
        if matches.len() >= 50 {
            break;
        }
    }

    HttpStateResponse {
        ts: Utc::now().to_rfc3339(),
        connections,
        tracked_matches,
        wickets_live,
        matches,
    }
}

async fn handle_http_connection(mut stream: TcpStream, state: ScoreHubState) -> Result<()> {
    let mut buf = vec![0u8; 8192];
    let n = stream.read(&mut buf).await.context("http read")?;
    if n == 0 {
        return Ok(());
    }

    let req = String::from_utf8_lossy(&buf[..n]);
    let first_line = req.lines().next().unwrap_or_default();
    let mut parts = first_line.split_whitespace();
    let method = parts.next().unwrap_or("");
    let path = parts.next().unwrap_or("");

    let (status_line, content_type, body) = match (method, path) {
        ("GET", "/health") => ("HTTP/1.1 200 OK", "text/plain; charset=utf-8", "ok".to_string()),
        ("GET", "/state") => {
            let snap = build_state_snapshot(&state).await;
            let json = serde_json::to_string_pretty(&snap).unwrap_or_else(|_| "{}".to_string());
            ("HTTP/1.1 200 OK", "application/json; charset=utf-8", json)
        }
        _ => (
            "HTTP/1.1 404 Not Found",
            "text/plain; charset=utf-8",
            "not found".to_string(),
        ),
    };

    let resp = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.as_bytes().len(),
        body
    );
    stream.write_all(resp.as_bytes()).await.context("http write")?;
    Ok(())
}

async fn start_http_server(state: ScoreHubState, bind: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(bind).await.context("http bind")?;
    info!("score-hub http listening on http://{} (GET /health, /state)", bind);

    loop {
        let (stream, peer) = listener.accept().await.context("http accept")?;
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_http_connection(stream, state).await {
                debug!("http handler err {}: {}", peer, e);
            }
        });
    }
}

async fn handle_socket(
    peer: SocketAddr,
    stream: TcpStream,
    state: ScoreHubState,
    logger: Arc<EventLogger>,
    db_tx: mpsc::Sender<DbMsg>,
) -> Result<()> {
    let ws_stream = accept_async(stream).await.context("WS handshake failed")?;

    {
        let mut c = state.connections.write().await;
        *c += 1;
    }

    info!("WS feeder connected: {}", peer);

    let (mut ws_sink, mut ws_stream) = ws_stream.split();

    while let Some(msg) = ws_stream.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(e) => {
                warn!("WS recv err from {}: {}", peer, e);
                break;
            }
        };

        match msg {
            Message::Text(txt) => {
                let txt = txt.to_string();
                let parsed: Result<SnapshotEnvelope> = serde_json::from_str(&txt)
                    .context("invalid JSON envelope")
                    .map_err(Into::into);

                let (ok, note) = match parsed {
                    Ok(env) => {
                        if env.v != 1 {
                            (false, format!("unsupported version {}", env.v))
                        } else {
                            match env.msg_type {
                                HubMessageType::Snapshot => {
                                    let seen_at = parse_ts(&env.ts);
                                    let raw = RawSnapshot::from_value(env.payload);

                                    if raw.is_empty() {
                                        (false, "empty_snapshot_payload".to_string())
                                    } else {
                                        // Klíč potřebuje názvy týmů, ty dá až normalize —
                                        // první průchod s placeholder id, druhý s klíčem
                                        let provisional =
                                            normalize(&raw, "unkeyed", seen_at.timestamp());
                                        let key = match_key(env.match_id.as_deref(), &provisional);
                                        let snapshot_state =
                                            normalize(&raw, &key, seen_at.timestamp());

                                        let _ = db_tx.try_send(DbMsg::StateAppend(
                                            DbStateRow::from_state(&snapshot_state),
                                        ));

                                        state.matches.write().await.insert(
                                            key.clone(),
                                            TrackedMatch {
                                                source: env.source.clone(),
                                                seen_at,
                                                state: snapshot_state,
                                            },
                                        );

                                        (true, format!("snapshot_ingested:{key}"))
                                    }
                                }
                                HubMessageType::Heartbeat => (true, "heartbeat".to_string()),
                            }
                        }
                    }
                    Err(e) => (false, format!("parse_error:{}", e)),
                };

                let ingest = HubIngestEvent {
                    ts: Utc::now().to_rfc3339(),
                    event: "HUB_INGEST",
                    source: "ws".to_string(),
                    msg_type: "text".to_string(),
                    ok,
                    note: note.clone(),
                };
                let _ = logger.log(&ingest);

                let _ = db_tx.try_send(DbMsg::Ingest(DbIngestRow {
                    ts: Utc::now(),
                    source: "ws".to_string(),
                    msg_type: "text".to_string(),
                    ok,
                    note: note.clone(),
                    raw_json: Some(txt.clone()),
                }));

                let ack = serde_json::json!({"ok": ok, "note": note});
                let _ = ws_sink.send(Message::Text(ack.to_string().into())).await;
            }
            Message::Ping(payload) => {
                let _ = ws_sink.send(Message::Pong(payload)).await;
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    info!("WS feeder disconnected: {}", peer);
    {
        let mut c = state.connections.write().await;
        *c = c.saturating_sub(1);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let bind = std::env::var("SCORE_HUB_BIND").unwrap_or_else(|_| "0.0.0.0:8090".to_string());
    let addr: SocketAddr = bind.parse().context("Invalid SCORE_HUB_BIND")?;

    let listener = TcpListener::bind(addr).await.context("bind failed")?;
    info!("score-hub listening on ws://{}/feed", addr);

    let state = ScoreHubState::new();
    let logger = Arc::new(EventLogger::new("logs"));

    let db_path = std::env::var("MATCH_DB_PATH").unwrap_or_else(|_| "data/match.db".to_string());
    info!("score-hub DB: {}", db_path);
    let db_tx = spawn_db_writer(DbConfig { path: db_path });

    // Minimal HTTP read-only state endpoint
    {
        let http_bind = std::env::var("SCORE_HTTP_BIND").unwrap_or_else(|_| "127.0.0.1:8091".to_string());
        let http_addr: SocketAddr = http_bind.parse().context("Invalid SCORE_HTTP_BIND")?;
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = start_http_server(state, http_addr).await {
                warn!("http server stopped: {e}");
            }
        });
    }

    // Heartbeat summary
    {
        let state = state.clone();
        let logger = Arc::clone(&logger);
        let db_tx = db_tx.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(10)).await;

                let connections = *state.connections.read().await;
                let (tracked_matches, wickets_live) = {
                    let matches = state.matches.read().await;
                    let wickets = matches.values().filter(|m| m.state.wicket_just_fell).count();
                    (matches.len(), wickets)
                };

                let hb = HubHeartbeatEvent {
                    ts: Utc::now().to_rfc3339(),
                    event: "SCORE_HUB_HEARTBEAT",
                    connections,
                    tracked_matches,
                    wickets_live,
                };

                let _ = logger.log(&hb);
                let _ = db_tx.try_send(DbMsg::Heartbeat(DbHeartbeatRow {
                    ts: Utc::now(),
                    tracked_matches: tracked_matches as i64,
                    states_appended: 0,
                    commentary_written: 0,
                }));
                info!(
                    "HB: conns={}, tracked={}, wickets_live={} (see logs/*.jsonl)",
                    connections, tracked_matches, wickets_live
                );
            }
        });
    }

    // NOTE: path routing se řeší u higher-level serverů; tady přijímáme WS na jakémkoliv path.
    while let Ok((stream, peer)) = listener.accept().await {
        let state = state.clone();
        let logger = Arc::clone(&logger);
        let db_tx = db_tx.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_socket(peer, stream, state, logger, db_tx).await {
                debug!("socket handler err {}: {}", peer, e);
            }
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalize_name_folds_diacritics() {
        assert_eq!(normalize_name("São Paulo XI"), "sao paulo xi");
        assert_eq!(normalize_name("  Łódź  Lions "), "lodz lions");
        assert_eq!(normalize_name("U.A.E."), "u a e");
    }

    #[test]
    fn match_key_prefers_explicit_id() {
        let raw = RawSnapshot::from_value(json!({ "title": "India vs Pakistan" }));
        let state = normalize(&raw, "unkeyed", 0);

        assert_eq!(match_key(Some("107563"), &state), "107563");
        assert_eq!(match_key(Some("  "), &state), "cricket::india_vs_pakistan");
        assert_eq!(match_key(None, &state), "cricket::india_vs_pakistan");
    }

    #[test]
    fn parse_ts_falls_back_to_now() {
        let fixed = parse_ts(&Some("2026-08-05T10:00:00Z".to_string()));
        assert_eq!(fixed.to_rfc3339(), "2026-08-05T10:00:00+00:00");

        let now_before = Utc::now();
        let fallback = parse_ts(&Some("not-a-date".to_string()));
        assert!(fallback >= now_before);
    }

    #[test]
    fn snapshot_envelope_round_trips() {
        let wire = r#"{"v":1,"type":"snapshot","source":"userscript","match_id":"107563","ts":null,"payload":{"livescore":"10/0"}}"#;
        let env: SnapshotEnvelope = serde_json::from_str(wire).expect("envelope parses");
        assert!(matches!(env.msg_type, HubMessageType::Snapshot));
        assert_eq!(env.match_id.as_deref(), Some("107563"));
    }
}
