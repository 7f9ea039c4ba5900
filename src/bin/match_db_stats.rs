use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension};

fn main() -> Result<()> {
    let db_path = std::env::var("MATCH_DB_PATH").unwrap_or_else(|_| "data/match.db".to_string());
    let conn = Connection::open(&db_path).with_context(|| format!("open db at {db_path}"))?;

    let tables = [
        "ingest_events",
        "match_state",
        "commentary",
        "pipeline_heartbeat",
    ];

    println!("db_path={db_path}");
    for t in tables {
        let count: i64 = conn
            .query_row(&format!("SELECT COUNT(1) FROM {t}"), [], |r| r.get(0))
            .with_context(|| format!("count {t}"))?;
        println!("{t}: {count}");
    }

    let last_state: Option<(String, i64, String, String, String)> = conn
        .query_row(
            "SELECT match_id, captured_at, team_a, team_b, score_text FROM match_state ORDER BY captured_at DESC LIMIT 1",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)),
        )
        .optional()
        .context("read last match state")?;

    if let Some((match_id, captured_at, team_a, team_b, score_text)) = last_state {
        println!(
            "last_state: match_id={match_id} captured_at={captured_at} {team_a} vs {team_b} score={score_text}"
        );
    } else {
        println!("last_state: <none>");
    }

    let last_hb: Option<(String, i64, i64, i64)> = conn
        .query_row(
            "SELECT ts, tracked_matches, states_appended, commentary_written FROM pipeline_heartbeat ORDER BY ts DESC LIMIT 1",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .optional()
        .context("read last heartbeat")?;

    if let Some((ts, tracked_matches, states_appended, commentary_written)) = last_hb {
        println!(
            "last_heartbeat: ts={ts} tracked_matches={tracked_matches} states_appended={states_appended} commentary_written={commentary_written}"
        );
    } else {
        println!("last_heartbeat: <none>");
    }

    Ok(())
}
