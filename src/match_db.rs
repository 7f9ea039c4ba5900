use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use match_state::MatchState;
use rusqlite::{params, Connection};
use std::path::Path;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct DbIngestRow {
    pub ts: DateTime<Utc>,
    pub source: String,
    pub msg_type: String,
    pub ok: bool,
    pub note: String,
    pub raw_json: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DbStateRow {
    pub match_id: String,
    pub captured_at: i64,
    pub team_a: String,
    pub team_b: String,
    pub score_text: String,
    pub context_text: String,
    pub runs_total: u32,
    pub wicket_just_fell: bool,
    pub state_json: String,
}

impl DbStateRow {
    pub fn from_state(state: &MatchState) -> Self {
        Self {
            match_id: state.match_id.clone(),
            captured_at: state.captured_at,
            team_a: state.team_a.clone(),
            team_b: state.team_b.clone(),
            score_text: state.score_text.clone(),
            context_text: state.context_text.clone(),
            runs_total: state.runs_total,
            wicket_just_fell: state.wicket_just_fell,
            state_json: serde_json::to_string(state).unwrap_or_else(|_| "{}".to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DbCommentaryRow {
    pub ts: DateTime<Utc>,
    pub match_id: String,
    pub captured_at: i64,
    pub model: String,
    pub stats_analysis: String,
    pub commentary: String,
}

#[derive(Debug, Clone)]
pub struct DbHeartbeatRow {
    pub ts: DateTime<Utc>,
    pub tracked_matches: i64,
    pub states_appended: i64,
    pub commentary_written: i64,
}

#[derive(Debug)]
pub enum DbMsg {
    Ingest(DbIngestRow),
    StateAppend(DbStateRow),
    Commentary(DbCommentaryRow),
    Heartbeat(DbHeartbeatRow),
}

pub fn spawn_db_writer(cfg: DbConfig) -> mpsc::Sender<DbMsg> {
    let (tx, mut rx) = mpsc::channel::<DbMsg>(10_000);

    std::thread::spawn(move || {
        let result: Result<()> = (|| {
            let db_path = Path::new(&cfg.path);
            if let Some(parent) = db_path.parent() {
                std::fs::create_dir_all(parent).ok();
            }

            let conn = Connection::open(db_path).context("open sqlite db")?;
            conn.pragma_update(None, "journal_mode", "WAL")
                .ok();
            conn.pragma_update(None, "synchronous", "NORMAL")
                .ok();

            init_schema(&conn)?;

            while let Some(msg) = rx.blocking_recv() {
                if let Err(e) = apply_msg(&conn, msg) {
                    // silent-ish: DB should not kill the pipeline
                    eprintln!("[match-db] write failed: {e}");
                }
            }

            Ok(())
        })();

        if let Err(e) = result {
            eprintln!("[match-db] fatal: {e}");
        }
    });

    tx
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS ingest_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ts TEXT NOT NULL,
            source TEXT NOT NULL,
            msg_type TEXT NOT NULL,
            ok INTEGER NOT NULL,
            note TEXT NOT NULL,
            raw_json TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_ingest_ts ON ingest_events(ts);

        -- append-only: one row per poll tick, never updated
        CREATE TABLE IF NOT EXISTS match_state (
            match_id TEXT NOT NULL,
            captured_at INTEGER NOT NULL,
            team_a TEXT NOT NULL,
            team_b TEXT NOT NULL,
            score_text TEXT NOT NULL,
            context_text TEXT NOT NULL,
            runs_total INTEGER NOT NULL,
            wicket_just_fell INTEGER NOT NULL,
            state_json TEXT NOT NULL,
            PRIMARY KEY (match_id, captured_at)
        );

        CREATE INDEX IF NOT EXISTS idx_state_captured ON match_state(captured_at);

        CREATE TABLE IF NOT EXISTS commentary (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ts TEXT NOT NULL,
            match_id TEXT NOT NULL,
            captured_at INTEGER NOT NULL,
            model TEXT NOT NULL,
            stats_analysis TEXT NOT NULL,
            commentary TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_commentary_match ON commentary(match_id);

        CREATE TABLE IF NOT EXISTS pipeline_heartbeat (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ts TEXT NOT NULL,
            tracked_matches INTEGER NOT NULL,
            states_appended INTEGER NOT NULL,
            commentary_written INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_hb_ts ON pipeline_heartbeat(ts);
        "#,
    ).context("init schema")?;

    Ok(())
}

fn apply_msg(conn: &Connection, msg: DbMsg) -> Result<()> {
    match msg {
        DbMsg::Ingest(r) => {
            conn.execute(
                "INSERT INTO ingest_events(ts, source, msg_type, ok, note, raw_json) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![r.ts.to_rfc3339(), r.source, r.msg_type, if r.ok { 1 } else { 0 }, r.note, r.raw_json],
            )?;
        }
        DbMsg::StateAppend(r) => {
            conn.execute(
                r#"
                INSERT INTO match_state(match_id, captured_at, team_a, team_b, score_text, context_text, runs_total, wicket_just_fell, state_json)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ON CONFLICT(match_id, captured_at) DO NOTHING
                "#,
                params![
                    r.match_id,
                    r.captured_at,
                    r.team_a,
                    r.team_b,
                    r.score_text,
                    r.context_text,
                    r.runs_total,
                    if r.wicket_just_fell { 1 } else { 0 },
                    r.state_json,
                ],
            )?;
        }
        DbMsg::Commentary(r) => {
            conn.execute(
                "INSERT INTO commentary(ts, match_id, captured_at, model, stats_analysis, commentary) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    r.ts.to_rfc3339(),
                    r.match_id,
                    r.captured_at,
                    r.model,
                    r.stats_analysis,
                    r.commentary,
                ],
            )?;
        }
        DbMsg::Heartbeat(r) => {
            conn.execute(
                "INSERT INTO pipeline_heartbeat(ts, tracked_matches, states_appended, commentary_written) VALUES (?1, ?2, ?3, ?4)",
                params![r.ts.to_rfc3339(), r.tracked_matches, r.states_appended, r.commentary_written],
            )?;
        }
    }

    Ok(())
}
