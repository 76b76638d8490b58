use chrono::Utc;
use market_watch_engine::{
    Alert, AlertCondition, ChannelSink, CompositeSink, EngineConfig, Holding, LogSink,
    MarketWatch, MemoryStore, NewAlert, NewHolding, RecordStore,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    println!("Market Watch Demo");
    println!("=================");

    let alerts = Arc::new(MemoryStore::<Alert>::new());
    let holdings = Arc::new(MemoryStore::<Holding>::new());

    let channel = Arc::new(ChannelSink::new(16));
    let mut triggers = channel.subscribe();
    let sink = CompositeSink::new()
        .with_sink(Arc::new(LogSink::new()))
        .with_sink(channel.clone());

    let watch = MarketWatch::with_coingecko(
        EngineConfig::from_env(),
        alerts.clone(),
        holdings.clone(),
        Arc::new(sink),
    )?;

    // 1. First snapshot
    if let Err(e) = watch.poller().refresh_now().await {
        eprintln!("Initial refresh failed: {}", e);
        return Ok(());
    }

    let page = watch.dashboard_page("", 1);
    println!("\nPage {} of {} ({} coins)", page.page, page.total_pages, page.total_matches);
    println!("{:-<60}", "");
    for coin in page.items.iter().take(10) {
        println!(
            "{:<6} {:<20} ${:>14.2} {:>8.2}%",
            coin.symbol.to_uppercase(),
            coin.name,
            coin.current_price,
            coin.price_change_percentage_24h
        );
    }

    // 2. Seed an alert that fires on the first pass and a small holding
    if let Some(top) = page.items.first() {
        alerts
            .create(NewAlert::for_quote(
                top,
                top.current_price,
                AlertCondition::Above,
                "demo",
            ))
            .await?;
        holdings
            .create(NewHolding::for_quote(
                top,
                Decimal::new(5, 1),
                top.current_price * Decimal::new(9, 1),
                Utc::now().date_naive(),
            ))
            .await?;
    }

    // 3. Run the schedule and wait for triggers
    watch.start();
    match tokio::time::timeout(Duration::from_secs(15), triggers.recv()).await {
        Ok(Ok(event)) => println!("\nTriggered: {}", event.message()),
        Ok(Err(e)) => eprintln!("\nTrigger channel closed: {}", e),
        Err(_) => println!("\nNo alert triggered within 15s"),
    }

    let valuation = watch.portfolio().await?;
    println!(
        "\nPortfolio value ${:.2}, P/L ${:.2} ({}%)",
        valuation.totals.market_value,
        valuation.totals.profit_loss,
        valuation.totals.profit_loss_percent
    );

    let metrics = watch.poller().metrics();
    println!(
        "Snapshot p50 {:.0}ms, detail p50 {:.0}ms",
        metrics.snapshot.latency_p50_ms, metrics.detail.latency_p50_ms
    );

    watch.stop();
    Ok(())
}
