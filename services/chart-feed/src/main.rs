use std::sync::Arc;

use chart_feed::config::FeedConfig;
use chart_feed::indicators::{IndicatorKind, IndicatorOutput};
use chart_feed::poller::{read_cache, SnapshotPoller};
use chart_feed::session::{ChartFrame, ChartSession, SessionConfig};
use chart_feed::snapshot_cache::PriceSnapshotCache;
use chart_feed::source::{CandleSource, HttpMarketClient};
use chart_feed::SERVICE_VERSION;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use types::ids::InstrumentId;
use types::interval::Interval;

/// Fetch chart history, print the latest indicator values, then stream
/// price snapshots until Ctrl-C.
#[derive(Debug, Parser)]
#[command(name = "chart-feed", version = SERVICE_VERSION)]
struct Args {
    /// Candle interval: 1m, 5m, 15m, 1h or 1d
    #[arg(long, short = 'i', default_value_t = Interval::default())]
    interval: Interval,

    /// Comma-separated indicators to enable (default: all)
    #[arg(long, value_delimiter = ',')]
    indicators: Vec<IndicatorKind>,

    /// Instrument ids to chart
    #[arg(required = true)]
    instruments: Vec<InstrumentId>,
}

impl Args {
    fn enabled_indicators(&self) -> Vec<IndicatorKind> {
        if self.indicators.is_empty() {
            IndicatorKind::all().to_vec()
        } else {
            self.indicators.clone()
        }
    }
}

fn print_frame(frame: &ChartFrame) {
    let instrument = frame.instrument.as_ref().map(InstrumentId::as_str).unwrap_or("-");
    println!(
        "{} {} candles={} last_close={}",
        instrument,
        frame.interval,
        frame.candles.len(),
        frame.last_close().map(|c| format!("{c:.4}")).unwrap_or_else(|| "-".into())
    );

    for result in frame.indicators.values() {
        match &result.output {
            IndicatorOutput::Lines(lines) => {
                for line in lines {
                    match line.points.last() {
                        Some(value) => println!("  {:<14} {value:.4}", line.label),
                        None => println!("  {:<14} -", line.label),
                    }
                }
            }
            IndicatorOutput::Macd(series) => match series.points.last() {
                Some(p) => println!(
                    "  {:<14} macd={:.4} signal={:.4} hist={:.4}",
                    series.label, p.macd, p.signal, p.histogram
                ),
                None => println!("  {:<14} -", series.label),
            },
            IndicatorOutput::Bollinger(series) => match series.points.last() {
                Some(p) => println!(
                    "  {:<14} upper={:.4} middle={:.4} lower={:.4} %b={:.3}",
                    series.label, p.upper, p.middle, p.lower, p.pb
                ),
                None => println!("  {:<14} -", series.label),
            },
        }
    }
    for warning in &frame.warnings {
        println!("  warning: {warning}");
    }
}

fn print_prices(cache: &PriceSnapshotCache) {
    for (id, snapshot) in cache.iter() {
        println!(
            "{id:<12} {:>12.4} {:>+10.4} ({:+.2}%)",
            snapshot.last_price, snapshot.change, snapshot.change_pct
        );
    }
    if let Some(err) = cache.last_error() {
        println!("(stale: {err})");
    }
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = FeedConfig::from_env()?;
    tracing::info!(base_url = %config.base_url, instruments = args.instruments.len(), "Starting chart feed");

    let client = Arc::new(HttpMarketClient::new(&config)?);

    for instrument in &args.instruments {
        let mut session = ChartSession::new(SessionConfig::from(&config));
        let ticket = session.select(instrument.clone(), args.interval);
        for kind in args.enabled_indicators() {
            session.set_indicator_enabled(kind, true);
        }
        let result = client.fetch_candles(&ticket.query).await;
        session.complete_fetch(ticket, result);
        print_frame(session.frame());
    }

    let mut poller = SnapshotPoller::spawn(client.clone(), config.poller_config(), args.instruments.clone());
    let cache = poller.cache();
    let mut ticker = tokio::time::interval(config.refresh_period);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => print_prices(&read_cache(&cache)),
        }
    }

    poller.stop();
    tracing::info!("Chart feed stopped");
    Ok(())
}
