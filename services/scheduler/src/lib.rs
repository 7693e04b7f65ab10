//! Background scheduler
//!
//! Owns the periodic loops the trading core needs: matching passes,
//! expiry sweeps for orders and locks, archival of terminal orders and
//! the market ticker. One `Scheduler` instance drives any number of
//! markets; every loop shuts down through a shared watch channel.
//!
//! Loop failures are logged and the loop keeps running: a single bad
//! pass must not stop the schedule.

pub mod ticker;

pub use ticker::Ticker;

use matching_engine::{MatchOptions, MatchingEngine};
use settlement::LockManager;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use types::trade::Trade;

/// Loop intervals and matching options.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How often a matching pass runs.
    pub matching_interval: Duration,
    /// How often expiry sweeps and archival run.
    pub cleanup_interval: Duration,
    /// How often the ticker folds trades and broadcasts prices.
    pub ticker_interval: Duration,
    pub match_options: MatchOptions,
    /// Terminal orders older than this are hard-deleted by the cleanup
    /// loop.
    pub archive_after_ms: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            matching_interval: Duration::from_secs(30),
            cleanup_interval: Duration::from_secs(5 * 60),
            ticker_interval: Duration::from_secs(1),
            match_options: MatchOptions::default(),
            archive_after_ms: 30 * 24 * 60 * 60 * 1000,
        }
    }
}

/// One market under the scheduler.
#[derive(Clone)]
pub struct Market {
    pub engine: Arc<MatchingEngine>,
    /// Optional: markets without a chart surface run no ticker.
    pub ticker: Option<Arc<Ticker>>,
}

/// Handle over the running background loops.
///
/// Must be started from within a tokio runtime. [`Scheduler::stop`]
/// shuts the loops down cooperatively; dropping the handle without
/// stopping aborts them.
pub struct Scheduler {
    markets: Vec<Market>,
    match_options: MatchOptions,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Spawn the matching, cleanup and ticker loops.
    pub fn start(
        config: SchedulerConfig,
        markets: Vec<Market>,
        locks: Option<Arc<LockManager>>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        let mut tasks = Vec::new();

        {
            let markets = markets.clone();
            let options = config.match_options.clone();
            let mut rx = shutdown.subscribe();
            let period = config.matching_interval;
            tasks.push(tokio::spawn(async move {
                let mut interval = time::interval(period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = rx.changed() => break,
                        _ = interval.tick() => run_matching(&markets, &options),
                    }
                }
                tracing::debug!("matching loop stopped");
            }));
        }

        {
            let markets = markets.clone();
            let locks = locks.clone();
            let mut rx = shutdown.subscribe();
            let period = config.cleanup_interval;
            let archive_after_ms = config.archive_after_ms;
            tasks.push(tokio::spawn(async move {
                let mut interval = time::interval(period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = rx.changed() => break,
                        _ = interval.tick() => run_cleanup(&markets, locks.as_deref(), archive_after_ms),
                    }
                }
                tracing::debug!("cleanup loop stopped");
            }));
        }

        {
            let tickers: Vec<Arc<Ticker>> = markets
                .iter()
                .filter_map(|market| market.ticker.clone())
                .collect();
            if !tickers.is_empty() {
                let mut rx = shutdown.subscribe();
                let period = config.ticker_interval;
                tasks.push(tokio::spawn(async move {
                    let mut interval = time::interval(period);
                    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                    loop {
                        tokio::select! {
                            _ = rx.changed() => break,
                            _ = interval.tick() => {
                                for ticker in &tickers {
                                    if let Err(err) = ticker.tick() {
                                        tracing::warn!(%err, "ticker tick failed");
                                    }
                                }
                            }
                        }
                    }
                    tracing::debug!("ticker loop stopped");
                }));
            }
        }

        tracing::info!(markets = markets.len(), "scheduler started");
        Self {
            markets,
            match_options: config.match_options,
            shutdown,
            tasks,
        }
    }

    /// Run a matching pass across every market right now, outside the
    /// schedule. Returns the trades produced; failed markets log and
    /// contribute nothing.
    pub fn trigger_matching(&self) -> Vec<Trade> {
        let mut executed = Vec::new();
        for market in &self.markets {
            match market.engine.match_orders(&self.match_options) {
                Ok(trades) => executed.extend(trades),
                Err(err) => tracing::warn!(%err, "triggered matching pass failed"),
            }
        }
        executed
    }

    pub fn is_running(&self) -> bool {
        self.tasks.iter().any(|task| !task.is_finished())
    }

    /// Signal every loop to stop and wait for them to finish.
    pub async fn stop(mut self) {
        let _ = self.shutdown.send(true);
        for task in std::mem::take(&mut self.tasks) {
            let _ = task.await;
        }
        tracing::info!("scheduler stopped");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

fn run_matching(markets: &[Market], options: &MatchOptions) {
    for market in markets {
        match market.engine.match_orders(options) {
            Ok(trades) if !trades.is_empty() => {
                tracing::debug!(trades = trades.len(), "scheduled matching pass");
            }
            Ok(_) => {}
            Err(err) => tracing::warn!(%err, "scheduled matching pass failed"),
        }
    }
}

fn run_cleanup(markets: &[Market], locks: Option<&LockManager>, archive_after_ms: i64) {
    for market in markets {
        let book = market.engine.book();
        if let Err(err) = book.cleanup_expired_orders() {
            tracing::warn!(%err, "order expiry sweep failed");
        }
        if let Err(err) = book.archive_terminal_orders(archive_after_ms) {
            tracing::warn!(%err, "order archival failed");
        }
    }
    if let Some(locks) = locks {
        if let Err(err) = locks.process_expired_locks() {
            tracing::warn!(%err, "lock expiry sweep failed");
        }
    }
}
