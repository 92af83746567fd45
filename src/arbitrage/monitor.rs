//! Opportunity Monitor
//!
//! Polls a fixed set of (path, amount) probes at a fixed interval and emits
//! every cycle that beats the profit threshold.
//!
//! Tick flow:
//! 1. `source.begin_tick()` (simulated sources refresh reserves here)
//! 2. evaluate all eligible probes, at most `concurrency` in flight,
//!    results merged back in probe order
//! 3. filter by threshold, emit to the sink in path-then-amount order
//!
//! A failing probe is retried with backoff (quote failures only), then
//! logged and skipped for the tick. Ticks never overlap: a slow tick is
//! followed immediately by the next one (`MissedTickBehavior::Delay`).

use crate::arbitrage::cooldown::RouteCooldown;
use crate::arbitrage::evaluator::{CycleEvaluator, ProfitThreshold};
use crate::arbitrage::quoter::QuoteSource;
use crate::error::ArbError;
use crate::report::{OpportunityReport, OpportunitySink};
use crate::types::{max_input_amount, Opportunity, TradePath};
use alloy::primitives::U256;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Retry of quote failures inside a tick, exponential backoff from `base_delay`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per probe per tick (1 = no retry)
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay before attempt `attempt + 1`: base, 2x base, 4x base...
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub interval: Duration,
    pub threshold: ProfitThreshold,
    /// Probes evaluated concurrently within a tick
    pub concurrency: usize,
    pub retry: RetryPolicy,
    /// Ticks to skip a failing probe (escalating); 0 disables
    pub failure_cooldown_ticks: u64,
    /// Log a stats line every N ticks; 0 disables
    pub stats_every_ticks: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            threshold: ProfitThreshold::ANY_PROFIT,
            concurrency: 4,
            retry: RetryPolicy::default(),
            failure_cooldown_ticks: 0,
            stats_every_ticks: 60,
        }
    }
}

/// One (path, input amount) pair evaluated every tick
#[derive(Debug, Clone)]
pub struct Probe {
    pub path: Arc<TradePath>,
    pub amount: U256,
    pub label: String,
}

impl Probe {
    pub fn new(path: Arc<TradePath>, amount: U256) -> Result<Self, ArbError> {
        if amount.is_zero() {
            return Err(ArbError::InvalidAmount(format!("{}: probe amount is zero", path)));
        }
        if amount > max_input_amount() {
            return Err(ArbError::InvalidAmount(format!("{}: probe amount {} is too large", path, amount)));
        }
        let label = format!("{}@{}", path.label(), path.start().format_amount(amount));
        Ok(Self { path, amount, label })
    }
}

/// Cross every path with every human-unit amount, path-major.
///
/// Amounts are parsed in the decimals of each path's start token.
pub fn build_probes(paths: &[TradePath], amounts: &[String]) -> Result<Vec<Probe>, ArbError> {
    let mut probes = Vec::with_capacity(paths.len() * amounts.len());
    for path in paths {
        let shared = Arc::new(path.clone());
        for human in amounts {
            let amount = path.start().parse_amount(human)?;
            probes.push(Probe::new(shared.clone(), amount)?);
        }
    }
    Ok(probes)
}

/// Running counters, returned by `run` on shutdown
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorStats {
    pub ticks: u64,
    pub evaluations: u64,
    pub failures: u64,
    pub retries: u64,
    pub skipped: u64,
    pub opportunities: u64,
}

/// Result of one tick
#[derive(Debug, Default)]
pub struct TickOutcome {
    /// Above threshold, in probe order
    pub opportunities: Vec<Opportunity>,
    pub evaluated: usize,
    pub failed: usize,
    pub skipped: usize,
    pub elapsed: Duration,
}

pub struct OpportunityMonitor {
    probes: Vec<Probe>,
    config: MonitorConfig,
    cooldown: RouteCooldown,
    stats: MonitorStats,
}

impl OpportunityMonitor {
    /// Validate everything up front; nothing here touches the network
    pub fn new(paths: &[TradePath], amounts: &[String], config: MonitorConfig) -> Result<Self, ArbError> {
        Self::with_probes(build_probes(paths, amounts)?, config)
    }

    pub fn with_probes(probes: Vec<Probe>, config: MonitorConfig) -> Result<Self, ArbError> {
        if probes.is_empty() {
            return Err(ArbError::InvalidConfig("no (path, amount) probes to monitor".to_string()));
        }
        if config.interval.is_zero() {
            return Err(ArbError::InvalidConfig("poll interval must be positive".to_string()));
        }
        if config.concurrency == 0 {
            return Err(ArbError::InvalidConfig("concurrency must be at least 1".to_string()));
        }
        if config.retry.max_attempts == 0 {
            return Err(ArbError::InvalidConfig("max_attempts must be at least 1".to_string()));
        }
        // Only cycles have a profit to compare against the threshold
        if let Some(probe) = probes.iter().find(|p| !p.path.is_cycle()) {
            return Err(ArbError::IncompleteCycle {
                start: probe.path.start().symbol.clone(),
                end: probe.path.end().symbol.clone(),
            });
        }

        Ok(Self {
            cooldown: RouteCooldown::new(config.failure_cooldown_ticks),
            probes,
            config,
            stats: MonitorStats::default(),
        })
    }

    pub fn probes(&self) -> &[Probe] {
        &self.probes
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn stats(&self) -> &MonitorStats {
        &self.stats
    }

    /// Evaluate every eligible probe once
    pub async fn run_tick<S: QuoteSource + ?Sized>(&mut self, source: &S) -> TickOutcome {
        let started = Instant::now();
        self.stats.ticks += 1;
        let tick = self.stats.ticks;

        if let Err(e) = source.begin_tick().await {
            warn!("Tick {}: {} source not refreshed: {}", tick, source.name(), e);
        }

        let (eligible, skipped): (Vec<usize>, Vec<usize>) = (0..self.probes.len())
            .partition(|&i| !self.cooldown.is_cooled_down(&self.probes[i].label, tick));
        for &i in &skipped {
            debug!("Tick {}: {} in cooldown", tick, self.probes[i].label);
        }

        let probes = &self.probes;
        let retry = self.config.retry;
        let results: Vec<(usize, Result<Opportunity, ArbError>, u32)> = stream::iter(eligible)
            .map(|i| async move {
                let (result, retries) = evaluate_with_retry(&probes[i], source, retry).await;
                (i, result, retries)
            })
            .buffered(self.config.concurrency)
            .collect()
            .await;

        let mut outcome = TickOutcome {
            skipped: skipped.len(),
            ..Default::default()
        };

        for (i, result, retries) in results {
            let label = &self.probes[i].label;
            self.stats.retries += retries as u64;
            match result {
                Ok(opportunity) => {
                    outcome.evaluated += 1;
                    self.cooldown.record_success(label);
                    if self.config.threshold.is_met(&opportunity) {
                        outcome.opportunities.push(opportunity);
                    } else {
                        debug!(
                            "{}: out={} roi={:.4}% below threshold",
                            label,
                            opportunity.amount_out,
                            opportunity.roi_percent().unwrap_or(0.0)
                        );
                    }
                }
                Err(e) => {
                    outcome.failed += 1;
                    warn!("Tick {}: {} skipped: {}", tick, label, e);
                    self.cooldown.record_failure(label, tick);
                }
            }
        }
        self.cooldown.cleanup(tick);

        self.stats.evaluations += outcome.evaluated as u64;
        self.stats.failures += outcome.failed as u64;
        self.stats.skipped += outcome.skipped as u64;
        self.stats.opportunities += outcome.opportunities.len() as u64;
        outcome.elapsed = started.elapsed();

        debug!(
            "Tick {} done in {:?}: {} evaluated, {} failed, {} skipped, {} opportunities",
            tick,
            outcome.elapsed,
            outcome.evaluated,
            outcome.failed,
            outcome.skipped,
            outcome.opportunities.len()
        );
        outcome
    }

    /// Poll until `cancel` fires. Cancellation drops the in-flight tick.
    pub async fn run<S, K>(
        &mut self,
        source: &S,
        sink: &K,
        cancel: CancellationToken,
    ) -> Result<MonitorStats, ArbError>
    where
        S: QuoteSource + ?Sized,
        K: OpportunitySink + ?Sized,
    {
        info!(
            "Monitoring {} probes via {} every {:?} (min profit {}%, concurrency {})",
            self.probes.len(),
            source.name(),
            self.config.interval,
            self.config.threshold.as_percent(),
            self.config.concurrency
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                outcome = self.run_tick(source) => outcome,
            };

            for opportunity in &outcome.opportunities {
                let report = OpportunityReport::from_opportunity(opportunity);
                if let Err(e) = sink.emit(&report).await {
                    warn!("Failed to report {}: {:#}", report.path_label(), e);
                }
            }

            let every = self.config.stats_every_ticks;
            if every > 0 && self.stats.ticks % every == 0 {
                self.log_stats();
            }
        }

        info!("Monitor cancelled");
        self.log_stats();
        Ok(self.stats.clone())
    }

    fn log_stats(&self) {
        let s = &self.stats;
        info!(
            "Stats: ticks={} evaluations={} failures={} retries={} skipped={} opportunities={}",
            s.ticks, s.evaluations, s.failures, s.retries, s.skipped, s.opportunities
        );
    }
}

async fn evaluate_with_retry<S: QuoteSource + ?Sized>(
    probe: &Probe,
    source: &S,
    retry: RetryPolicy,
) -> (Result<Opportunity, ArbError>, u32) {
    let mut attempt = 1;
    loop {
        match CycleEvaluator::evaluate(&probe.path, probe.amount, source).await {
            Err(e) if e.is_retriable() && attempt < retry.max_attempts => {
                let delay = retry.delay_after(attempt);
                debug!("{} attempt {} failed ({}), retrying in {:?}", probe.label, attempt, e, delay);
                sleep(delay).await;
                attempt += 1;
            }
            result => return (result, attempt - 1),
        }
    }
}
