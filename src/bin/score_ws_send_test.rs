use anyhow::{Context, Result};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio_tungstenite::{connect_async, tungstenite::Message};

#[tokio::main]
async fn main() -> Result<()> {
    let url = std::env::var("SCORE_HUB_URL").unwrap_or_else(|_| "ws://127.0.0.1:8090/feed".to_string());
    let source = std::env::var("SCORE_FEED_SOURCE").unwrap_or_else(|_| "test".to_string());

    let (ws, _resp) = connect_async(&url)
        .await
        .with_context(|| format!("connect to {url}"))?;
    let (mut sink, mut stream) = ws.split();

    // 1) snapshot s explicitním match_id
    let snapshot = json!({
        "v": 1,
        "type": "snapshot",
        "source": source,
        "match_id": "107563",
        "ts": Utc::now().to_rfc3339(),
        "payload": {
            "title": "India vs Pakistan - 2nd ODI",
            "livescore": "250/5",
            "update": "Wicket falls!",
            "batterone": "Kohli",
            "batsmanonerun": 82,
            "batsmanoneball": 60,
            "bowlerone": "Shaheen",
            "bowleroneovers": "8.2",
            "bowleronerun": 41,
            "bowleronewicket": 2
        }
    });

    sink.send(Message::Text(snapshot.to_string().into())).await?;
    if let Some(msg) = stream.next().await {
        if let Ok(Message::Text(t)) = msg {
            println!("ack1={}", t);
        }
    }

    // 2) snapshot bez match_id — hub klíčuje podle názvů týmů
    let unkeyed = json!({
        "v": 1,
        "type": "snapshot",
        "source": "userscript",
        "ts": Utc::now().to_rfc3339(),
        "payload": {
            "title": "Australia vs England - 1st Test",
            "livescore": "118/3",
            "update": "Drinks break"
        }
    });

    sink.send(Message::Text(unkeyed.to_string().into())).await?;
    if let Some(msg) = stream.next().await {
        if let Ok(Message::Text(t)) = msg {
            println!("ack2={}", t);
        }
    }

    // 3) heartbeat
    let hb = json!({
        "v": 1,
        "type": "heartbeat",
        "source": "client",
        "ts": Utc::now().to_rfc3339(),
        "payload": {}
    });

    sink.send(Message::Text(hb.to_string().into())).await?;
    if let Some(msg) = stream.next().await {
        if let Ok(Message::Text(t)) = msg {
            println!("ack3={}", t);
        }
    }

    let _ = sink.send(Message::Close(None)).await;
    Ok(())
}
