/// CrickLive — Live Cricket Commentary Pipeline
///
/// Co dělá:
///   1. Najde LIVE zápas (CRICKET_MATCH_ID env, jinak scraping live-scores)
///   2. Nastartuje companion scorecard API server (managed lifecycle)
///   3. Každých 30s: snapshot → normalize → JSONL log + sqlite append
///   4. Padlý wicket → NTFY push alert
///   5. Fire-and-forget AI komentář (Groq) — pomalá generace neblokuje další tick
///
/// Co NEDĚLÁ: žádné mergování ticků, každý stav stojí sám za sebe
///
/// Spuštění:
///   cargo run --bin live-commentary

use anyhow::{Context, Result};
use chrono::Utc;
use commentary_engine::CommentaryEngine;
use dotenv::dotenv;
use logger::{
    now_iso, send_ntfy_alert, CommentaryEvent, EventLogger, MatchStateEvent,
    PipelineHeartbeatEvent, WicketAlertEvent,
};
use match_state::{normalize, RawSnapshot};
use scoreboard_client::{MatchFinder, ScoreboardClient, ScoreboardServer, ScoreboardServerConfig};
use std::env;
use std::fs::File;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

mod match_db;
use match_db::{
    spawn_db_writer, DbCommentaryRow, DbConfig, DbHeartbeatRow, DbIngestRow, DbMsg, DbStateRow,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    info!("=== CrickLive — LIVE COMMENTARY PIPELINE ===");
    info!("Flow: scorecard API → match state → {{jsonl, sqlite, commentary}}");
    info!("Logs: ./logs/");

    // Single instance lock
    let lock_file_path = env::temp_dir().join("cricklive_commentary.lock");
    let lock_file = match File::create(&lock_file_path) {
        Ok(f) => f,
        Err(e) => {
            warn!("Failed to create lock file at {:?}: {}", lock_file_path, e);
            return Ok(());
        }
    };

    let mut lock = fd_lock::RwLock::new(lock_file);
    let _write_guard = match lock.try_write() {
        Ok(guard) => {
            info!("Acquired single-instance lock.");
            guard
        }
        Err(_) => {
            warn!("Another instance of live-commentary is already running! Exiting.");
            return Ok(());
        }
    };

    let poll_interval_secs = env::var("CRICKET_POLL_INTERVAL_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(30)
        .max(5);

    info!("Live poll interval: {}s", poll_interval_secs);

    // Výběr zápasu: env override, jinak první live z finderu
    let match_id = match env::var("CRICKET_MATCH_ID") {
        Ok(id) if !id.trim().is_empty() => id.trim().to_string(),
        _ => {
            let finder = MatchFinder::new();
            let listings = finder
                .fetch_live_matches()
                .await
                .context("live match discovery failed")?;
            let Some(first) = listings.first() else {
                warn!("No live matches right now. Exiting.");
                return Ok(());
            };
            info!("Picked live match: {} (ID: {})", first.title, first.id);
            first.id.clone()
        }
    };

    // Companion scorecard server — attach nebo spawn + bounded readiness
    let mut server = ScoreboardServer::new(ScoreboardServerConfig::from_env());
    server.start().await.context("scoreboard server startup failed")?;

    let client = ScoreboardClient::new(server.base_url(), "logs");
    let jsonl = Arc::new(EventLogger::new("logs"));

    let db_path = env::var("MATCH_DB_PATH").unwrap_or_else(|_| "data/match.db".to_string());
    info!("match DB: {}", db_path);
    let db_tx = spawn_db_writer(DbConfig { path: db_path });

    let engine = Arc::new(CommentaryEngine::from_env()?);
    if !engine.is_configured() {
        warn!("GROQ_API_KEY not set — commentary disabled, pipeline runs state-only");
    }

    // Jeden commentary běh naráz; další ticky se nefrontují, jen přeskočí
    let commentary_slot = Arc::new(Semaphore::new(1));
    let commentary_written = Arc::new(AtomicU64::new(0));

    let mut ticks: u64 = 0;
    let mut states_appended: u64 = 0;
    let mut prev_wicket = false;

    info!("🚀 READY: Spouštím live commentary loop pro match {}.", match_id);

    loop {
        ticks += 1;
        debug!("--- poll tick {} ---", ticks);

        let raw = match client.fetch_snapshot(&match_id).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("snapshot fetch failed: {}", e);
                RawSnapshot::new()
            }
        };

        let state = normalize(&raw, &match_id, Utc::now().timestamp());

        info!(
            "{} vs {} | {} | wicket={}",
            state.team_a,
            state.team_b,
            if state.score_text.is_empty() { "-" } else { &state.score_text },
            state.wicket_just_fell
        );

        let _ = jsonl.log(&MatchStateEvent {
            ts: now_iso(),
            event: "MATCH_STATE",
            match_id: state.match_id.clone(),
            captured_at: state.captured_at,
            team_a: state.team_a.clone(),
            team_b: state.team_b.clone(),
            score_text: state.score_text.clone(),
            runs_total: state.runs_total,
            wicket_just_fell: state.wicket_just_fell,
        });

        let _ = db_tx.try_send(DbMsg::Ingest(DbIngestRow {
            ts: Utc::now(),
            source: "scorecard_api".to_string(),
            msg_type: "snapshot".to_string(),
            ok: !raw.is_empty(),
            note: if raw.is_empty() { "empty_snapshot" } else { "snapshot_ingested" }.to_string(),
            raw_json: serde_json::to_string(&raw).ok(),
        }));
        let _ = db_tx.try_send(DbMsg::StateAppend(DbStateRow::from_state(&state)));
        states_appended += 1;

        // Alert jen na náběžné hraně — stejný update se vrací víc ticků po sobě
        if state.wicket_just_fell && !prev_wicket {
            let _ = jsonl.log(&WicketAlertEvent {
                ts: now_iso(),
                event: "WICKET_ALERT",
                match_id: state.match_id.clone(),
                team_a: state.team_a.clone(),
                team_b: state.team_b.clone(),
                score_text: state.score_text.clone(),
                context_text: state.context_text.clone(),
            });

            let msg = format!("{} — {}", state.score_text, state.context_text);
            let title = format!("WICKET: {} vs {}", state.team_a, state.team_b);
            tokio::spawn(async move {
                send_ntfy_alert(&msg, &title).await;
            });
        }
        prev_wicket = state.wicket_just_fell;

        // Commentary dispatch — fire-and-forget, single-flight
        if engine.is_configured() && !raw.is_empty() {
            match commentary_slot.clone().try_acquire_owned() {
                Ok(permit) => {
                    let engine = engine.clone();
                    let jsonl = jsonl.clone();
                    let db_tx = db_tx.clone();
                    let commentary_written = commentary_written.clone();
                    let state = state.clone();
                    tokio::spawn(async move {
                        match engine.commentate(&state).await {
                            Ok(piece) => {
                                info!(
                                    "commentary ready for {} ({} chars)",
                                    piece.match_id,
                                    piece.commentary.len()
                                );
                                let _ = jsonl.log(&CommentaryEvent {
                                    ts: now_iso(),
                                    event: "COMMENTARY",
                                    match_id: piece.match_id.clone(),
                                    captured_at: piece.captured_at,
                                    model: piece.model.clone(),
                                    analysis_chars: piece.stats_analysis.len(),
                                    commentary_chars: piece.commentary.len(),
                                });
                                let _ = db_tx.try_send(DbMsg::Commentary(DbCommentaryRow {
                                    ts: Utc::now(),
                                    match_id: piece.match_id,
                                    captured_at: piece.captured_at,
                                    model: piece.model,
                                    stats_analysis: piece.stats_analysis,
                                    commentary: piece.commentary,
                                }));
                                commentary_written.fetch_add(1, Ordering::Relaxed);
                            }
                            Err(e) => warn!("commentary run failed: {}", e),
                        }
                        drop(permit);
                    });
                }
                Err(_) => debug!("commentary still in flight, skipping tick"),
            }
        }

        if ticks % 10 == 0 {
            let written = commentary_written.load(Ordering::Relaxed);
            let _ = jsonl.log(&PipelineHeartbeatEvent {
                ts: now_iso(),
                event: "PIPELINE_HEARTBEAT",
                match_id: match_id.clone(),
                poll_interval_secs,
                ticks,
                states_appended,
                commentary_written: written,
            });
            let _ = db_tx.try_send(DbMsg::Heartbeat(DbHeartbeatRow {
                ts: Utc::now(),
                tracked_matches: 1,
                states_appended: states_appended as i64,
                commentary_written: written as i64,
            }));
        }

        tokio::select! {
            _ = sleep(Duration::from_secs(poll_interval_secs)) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("ctrl-c — shutting down");
                break;
            }
        }
    }

    // Garantovaný teardown companion serveru i při ručním ukončení
    server.shutdown().await;
    Ok(())
}
