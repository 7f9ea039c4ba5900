use anyhow::Result;
use dotenv::dotenv;
use scoreboard_client::MatchFinder;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("info"))
        .init();

    let finder = MatchFinder::new();
    let listings = finder.fetch_live_matches().await?;

    if listings.is_empty() {
        println!("No live matches right now.");
        return Ok(());
    }

    println!("Available matches:");
    for (i, m) in listings.iter().enumerate() {
        let title = if m.title.is_empty() { "<untitled>" } else { &m.title };
        println!("{}. {} (ID: {})", i + 1, title, m.id);
    }

    println!();
    println!("Run: CRICKET_MATCH_ID=<ID> cargo run --bin live-commentary");
    Ok(())
}
