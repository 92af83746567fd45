//! cyclearb - cycle arbitrage evaluator
//!
//! Subcommands:
//! - `monitor` (default): poll every configured (path, amount) probe until
//!   SIGINT/SIGTERM, reporting profitable cycles
//! - `scan`: one tick, then exit
//! - `simulate`: pool-fee vs fee-free simulated quotes side by side, with
//!   per-hop price impact
//! - `gap A B`: implied price gap between two tokens
//! - `quote TOKENS.. --amount N`: raw router getAmountsOut along a path
//! - `check`: token metadata and pool reserves read from chain
//!
//! Live quotes go through the configured V2 router. `--simulate` quotes from
//! pool reserves instead (config values, refreshed from chain when an RPC
//! URL and pool addresses are available).

use alloy::primitives::{Address, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cyclearb::arbitrage::{build_probes, CycleEvaluator, OpportunityMonitor, QuoteSource, RouterQuoter, SimulatedQuoter};
use cyclearb::config::{AppConfig, ResolvedConfig};
use cyclearb::pool::ChainReader;
use cyclearb::report::{JsonlSink, LogSink, MultiSink, OpportunityReport, OpportunitySink};
use cyclearb::types::{format_token_amount, Opportunity};
use futures::StreamExt;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Cycle arbitrage evaluator for V2-style AMM pools
#[derive(Parser)]
#[command(name = "cyclearb", version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "CYCLEARB_CONFIG", default_value = "config/cyclearb.toml")]
    config: PathBuf,

    /// RPC endpoint (http, ws or ipc); overrides network.rpc_url
    #[arg(long, env = "RPC_URL")]
    rpc_url: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Poll until interrupted
    Monitor {
        /// Quote from pool reserves instead of the router
        #[arg(long)]
        simulate: bool,
    },
    /// Evaluate every probe once
    Scan {
        #[arg(long)]
        simulate: bool,
    },
    /// Compare pool-fee and fee-free quotes for every probe
    Simulate,
    /// Implied price gap between two tokens
    Gap {
        a: String,
        b: String,
        #[arg(long)]
        simulate: bool,
    },
    /// Router getAmountsOut along a list of token symbols
    Quote {
        #[arg(required = true, num_args = 2..)]
        tokens: Vec<String>,
        /// Input amount in human units of the first token
        #[arg(long, default_value = "1")]
        amount: String,
    },
    /// Verify token metadata and pool reserves on chain
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();

    let mut resolved = AppConfig::load(&args.config)?
        .resolve()
        .with_context(|| format!("Invalid configuration in {}", args.config.display()))?;
    if args.rpc_url.is_some() {
        resolved.rpc_url = args.rpc_url;
    }
    info!(
        "Configuration loaded from {}: {} tokens, {} pools, {} paths",
        args.config.display(),
        resolved.tokens.len(),
        resolved.book.len(),
        resolved.paths.len()
    );

    match args.command.unwrap_or(Command::Monitor { simulate: false }) {
        Command::Monitor { simulate } => run_monitor(&resolved, simulate).await,
        Command::Scan { simulate } => run_scan(&resolved, simulate).await,
        Command::Simulate => run_simulate(&resolved).await,
        Command::Gap { a, b, simulate } => run_gap(&resolved, &a, &b, simulate).await,
        Command::Quote { tokens, amount } => run_quote(&resolved, &tokens, &amount).await,
        Command::Check => run_check(&resolved).await,
    }
}

async fn connect(resolved: &ResolvedConfig) -> Result<Arc<DynProvider>> {
    let url = resolved.require_rpc_url()?;
    let provider = ProviderBuilder::new()
        .connect(url)
        .await
        .context("Invalid RPC URL")?
        .erased();

    let block = provider
        .get_block_number()
        .await
        .context("Failed to connect to RPC")?;
    info!("Connected! Latest block: {}", block);
    Ok(Arc::new(provider))
}

/// Simulated quoter over the configured book. Reserves are pulled from
/// chain once up front, and again every tick, when that is possible.
async fn simulated_quoter(resolved: &ResolvedConfig, fee_free: bool) -> Result<SimulatedQuoter> {
    let mut quoter = SimulatedQuoter::new(resolved.book.clone()).fee_free(fee_free);

    if resolved.rpc_url.is_some() && !resolved.book.with_address().is_empty() {
        let reader = Arc::new(ChainReader::new(connect(resolved).await?));
        let updated = reader.refresh_pools(&resolved.book).await?;
        let (pools, oldest, newest) = resolved.book.stats();
        info!(
            "Loaded on-chain reserves for {}/{} pools (blocks {}..={})",
            updated, pools, oldest, newest
        );
        quoter = quoter.with_refresh(reader);
    }

    quoter.validate_paths(&resolved.paths)?;
    if quoter.is_fee_free() {
        info!("Simulating without swap fees");
    }
    Ok(quoter)
}

async fn quote_source(resolved: &ResolvedConfig, simulate: bool) -> Result<Box<dyn QuoteSource>> {
    if simulate {
        return Ok(Box::new(simulated_quoter(resolved, resolved.fee_free).await?));
    }
    let router = resolved.require_router()?;
    let quoter = RouterQuoter::new(connect(resolved).await?, router);
    info!("Quoting through router {:?}", quoter.router());
    Ok(Box::new(quoter))
}

fn report_sink(resolved: &ResolvedConfig) -> Result<MultiSink> {
    let mut sink = MultiSink::new().with(LogSink);
    if let Some(path) = &resolved.jsonl_path {
        sink = sink.with(JsonlSink::new(path)?);
        info!("Appending opportunities to {}", path.display());
    }
    Ok(sink)
}

fn cancel_on_signal(cancel: CancellationToken) -> Result<()> {
    let mut signals = Signals::new([SIGINT, SIGTERM]).context("Failed to install signal handler")?;
    tokio::spawn(async move {
        if let Some(sig) = signals.next().await {
            info!("Received signal {}, shutting down", sig);
            cancel.cancel();
        }
    });
    Ok(())
}

async fn run_monitor(resolved: &ResolvedConfig, simulate: bool) -> Result<()> {
    let mut monitor = OpportunityMonitor::new(&resolved.paths, &resolved.amounts, resolved.monitor.clone())?;
    let source = quote_source(resolved, simulate).await?;
    let sink = report_sink(resolved)?;

    let cancel = CancellationToken::new();
    cancel_on_signal(cancel.clone())?;

    let stats = monitor.run(source.as_ref(), &sink, cancel).await?;
    info!(
        "Done: {} ticks, {} opportunities, {} failed evaluations",
        stats.ticks, stats.opportunities, stats.failures
    );
    Ok(())
}

async fn run_scan(resolved: &ResolvedConfig, simulate: bool) -> Result<()> {
    let mut monitor = OpportunityMonitor::new(&resolved.paths, &resolved.amounts, resolved.monitor.clone())?;
    let source = quote_source(resolved, simulate).await?;
    let sink = report_sink(resolved)?;

    let outcome = monitor.run_tick(source.as_ref()).await;
    for opportunity in &outcome.opportunities {
        sink.emit(&OpportunityReport::from_opportunity(opportunity)).await?;
    }
    if outcome.opportunities.is_empty() {
        info!(
            "No profitable opportunities (min {}% required)",
            resolved.monitor.threshold.as_percent()
        );
    }
    info!(
        "Scan: {} evaluated, {} failed in {:?}",
        outcome.evaluated, outcome.failed, outcome.elapsed
    );
    Ok(())
}

fn describe(opportunity: &Opportunity) -> String {
    let start = opportunity.path.start();
    let profit = opportunity
        .profit
        .map(|p| {
            let sign = if p.is_negative() { "-" } else { "+" };
            format!("{}{}", sign, format_token_amount(p.unsigned_abs(), start.decimals))
        })
        .unwrap_or_default();
    format!(
        "out {} {} ({} {}, {:.4}%)",
        opportunity.path.end().format_amount(opportunity.amount_out),
        opportunity.path.end().symbol,
        profit,
        start.symbol,
        opportunity.roi_percent().unwrap_or(0.0)
    )
}

fn symbol(resolved: &ResolvedConfig, address: Address) -> String {
    resolved
        .tokens
        .by_address(&address)
        .map(|t| t.symbol.clone())
        .unwrap_or_else(|| format!("{:?}", address))
}

async fn run_simulate(resolved: &ResolvedConfig) -> Result<()> {
    let with_fee = simulated_quoter(resolved, false).await?;
    let fee_free = SimulatedQuoter::new(resolved.book.clone()).fee_free(true);
    let probes = build_probes(&resolved.paths, &resolved.amounts)?;

    for probe in &probes {
        info!("── {}", probe.label);

        match with_fee.hop_impacts(&probe.path, probe.amount) {
            Ok(impacts) => {
                for hop in impacts {
                    info!(
                        "   {} -> {}: fee {} | price impact {:.4}%",
                        symbol(resolved, hop.token_in),
                        symbol(resolved, hop.token_out),
                        hop.fee,
                        hop.impact_percent
                    );
                }
            }
            Err(e) => warn!("   price impact: {}", e),
        }

        match with_fee.required_input(&probe.path, probe.amount) {
            Ok(needed) => info!(
                "   break-even input: {} {}",
                probe.path.start().format_amount(needed),
                probe.path.start().symbol
            ),
            Err(e) => warn!("   break-even input: {}", e),
        }

        match CycleEvaluator::evaluate(&probe.path, probe.amount, &with_fee).await {
            Ok(opp) => info!("   with pool fees: {}", describe(&opp)),
            Err(e) => warn!("   with pool fees: {}", e),
        }
        match CycleEvaluator::evaluate(&probe.path, probe.amount, &fee_free).await {
            Ok(opp) => info!("   fee-free:       {}", describe(&opp)),
            Err(e) => warn!("   fee-free:       {}", e),
        }
    }
    Ok(())
}

async fn run_gap(resolved: &ResolvedConfig, a: &str, b: &str, simulate: bool) -> Result<()> {
    let a = resolved.tokens.get(a)?;
    let b = resolved.tokens.get(b)?;
    let source = quote_source(resolved, simulate).await?;

    let gap = CycleEvaluator::implied_price_gap(source.as_ref(), a, b).await?;
    info!("1 {} = {:.6} {}", a, gap.forward_rate, b);
    info!("1 {} = {:.6} {}", b, gap.reverse_rate, a);
    info!("Theoretical 1 {} = {:.6} {}", b, 1.0 / gap.forward_rate, a);
    info!("Price gap: {:.4}%", gap.gap_percent);
    Ok(())
}

async fn run_quote(resolved: &ResolvedConfig, symbols: &[String], amount: &str) -> Result<()> {
    let tokens = symbols
        .iter()
        .map(|s| resolved.tokens.get(s).cloned())
        .collect::<Result<Vec<_>, _>>()?;
    let amount_in = tokens[0].parse_amount(amount)?;

    let quoter = RouterQuoter::new(connect(resolved).await?, resolved.require_router()?);
    let amounts = quoter
        .amounts_out(amount_in, tokens.iter().map(|t| t.address).collect())
        .await?;

    for (token, amount) in tokens.iter().zip(&amounts) {
        info!("{:>24} {}", token.format_amount(*amount), token.symbol);
    }
    Ok(())
}

async fn run_check(resolved: &ResolvedConfig) -> Result<()> {
    let reader = ChainReader::new(connect(resolved).await?);

    for result in reader.check_tokens(resolved.tokens.iter()).await {
        match result {
            Ok(check) => info!(
                "{} {:?}: {} ({}), {} decimals{}",
                check.token.symbol,
                check.token.address,
                check.name,
                check.symbol,
                check.decimals,
                if check.matches() { "" } else { "  MISMATCH" }
            ),
            Err(e) => warn!("Token check failed: {:#}", e),
        }
    }

    for pool in resolved.book.all() {
        let label = match (
            resolved.tokens.by_address(&pool.token0),
            resolved.tokens.by_address(&pool.token1),
        ) {
            (Some(t0), Some(t1)) => format!("{}/{}", t0.symbol, t1.symbol),
            _ => format!("{:?}/{:?}", pool.token0, pool.token1),
        };

        let address = match (pool.address, resolved.router) {
            (Some(address), _) => address,
            (None, Some(router)) => match reader.find_pair(router, pool.token0, pool.token1).await? {
                Some(address) => {
                    info!("{}: pair found at {:?} (not in config)", label, address);
                    address
                }
                None => {
                    warn!("{}: no pair deployed for this token pair", label);
                    continue;
                }
            },
            (None, None) => {
                warn!("{}: no pool address or router configured, skipping", label);
                continue;
            }
        };

        match reader.pair_state(address).await {
            Ok(state) => {
                let fmt_reserve = |token: Address, reserve: U256| match resolved.tokens.by_address(&token) {
                    Some(t) => format!("{} {}", t.format_amount(reserve), t.symbol),
                    None => reserve.to_string(),
                };
                if !(pool.contains(state.token0) && pool.contains(state.token1)) {
                    warn!("{}: pair {:?} holds different tokens", label, address);
                }
                info!(
                    "{} {:?}: {} / {}",
                    label,
                    address,
                    fmt_reserve(state.token0, state.reserve0),
                    fmt_reserve(state.token1, state.reserve1)
                );
            }
            Err(e) => warn!("{}: {:#}", label, e),
        }
    }
    Ok(())
}
