//! Opportunity Reporting
//!
//! Flattens an `Opportunity` into a serializable record and hands it to a
//! sink. Sinks:
//! - `LogSink` writes one tracing line per opportunity
//! - `JsonlSink` appends one JSON object per line to a file
//! - `ChannelSink` forwards to a tokio mpsc channel
//! - `MultiSink` fans out to several sinks
//!
//! Amounts are rendered twice: human units (decimal-adjusted) and raw base
//! units as strings, so nothing is lost to f64 in the file.

use crate::types::{format_token_amount, Opportunity};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// One profitable cycle as reported to the outside world
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpportunityReport {
    pub timestamp: DateTime<Utc>,
    /// Token symbols along the path
    pub path: Vec<String>,
    /// Token addresses along the path (checksummed)
    pub path_addresses: Vec<String>,
    /// Human units of the start token
    pub input_amount: String,
    pub output_amount: String,
    pub profit: String,
    pub roi_percent: f64,
    /// Base units
    pub input_raw: String,
    pub output_raw: String,
    pub profit_raw: String,
}

impl OpportunityReport {
    pub fn from_opportunity(opportunity: &Opportunity) -> Self {
        Self::at(opportunity, Utc::now())
    }

    pub fn at(opportunity: &Opportunity, timestamp: DateTime<Utc>) -> Self {
        let start = opportunity.path.start();
        let end = opportunity.path.end();

        let (profit, profit_raw) = match opportunity.profit {
            Some(p) => {
                let sign = if p.is_negative() { "-" } else { "" };
                (
                    format!("{}{}", sign, format_token_amount(p.unsigned_abs(), start.decimals)),
                    p.to_string(),
                )
            }
            None => (String::new(), String::new()),
        };

        Self {
            timestamp,
            path: opportunity.path.symbols(),
            path_addresses: opportunity.path.addresses().iter().map(|a| a.to_string()).collect(),
            input_amount: start.format_amount(opportunity.amount_in),
            output_amount: end.format_amount(opportunity.amount_out),
            profit,
            roi_percent: opportunity.roi_percent().unwrap_or(0.0),
            input_raw: opportunity.amount_in.to_string(),
            output_raw: opportunity.amount_out.to_string(),
            profit_raw,
        }
    }

    pub fn path_label(&self) -> String {
        self.path.join("->")
    }
}

/// Destination for reported opportunities
#[async_trait]
pub trait OpportunitySink: Send + Sync {
    async fn emit(&self, report: &OpportunityReport) -> Result<()>;
}

/// Log each opportunity at info level
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl OpportunitySink for LogSink {
    async fn emit(&self, report: &OpportunityReport) -> Result<()> {
        let start = report.path.first().map(String::as_str).unwrap_or_default();
        info!(
            "OPPORTUNITY {} | in {} {} -> out {} {} | profit {} {} ({:.4}%)",
            report.path_label(),
            report.input_amount,
            start,
            report.output_amount,
            start,
            report.profit,
            start,
            report.roi_percent
        );
        Ok(())
    }
}

/// Append-only JSON lines file
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    /// Creates the parent directory if needed
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create report directory: {:?}", parent))?;
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read_all(&self) -> Result<Vec<OpportunityReport>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(&self.path)?);
        let mut reports = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if !line.trim().is_empty() {
                let report: OpportunityReport = serde_json::from_str(&line)
                    .with_context(|| format!("Failed to parse JSON line: {}", line))?;
                reports.push(report);
            }
        }
        Ok(reports)
    }
}

#[async_trait]
impl OpportunitySink for JsonlSink {
    async fn emit(&self, report: &OpportunityReport) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open report file: {:?}", self.path))?;

        let json = serde_json::to_string(report).context("Failed to serialize report to JSON")?;
        writeln!(file, "{}", json)?;
        Ok(())
    }
}

/// Forward reports to an in-process consumer
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<OpportunityReport>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OpportunityReport>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl OpportunitySink for ChannelSink {
    async fn emit(&self, report: &OpportunityReport) -> Result<()> {
        self.tx
            .send(report.clone())
            .map_err(|_| anyhow!("report receiver dropped"))
    }
}

/// Fan out to every inner sink; one failing sink doesn't stop the others
#[derive(Default)]
pub struct MultiSink {
    sinks: Vec<Box<dyn OpportunitySink>>,
}

impl MultiSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl OpportunitySink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl OpportunitySink for MultiSink {
    async fn emit(&self, report: &OpportunityReport) -> Result<()> {
        let mut failed = 0;
        for sink in &self.sinks {
            if let Err(e) = sink.emit(report).await {
                warn!("Report sink failed: {:#}", e);
                failed += 1;
            }
        }
        if failed > 0 {
            return Err(anyhow!("{} of {} sinks failed", failed, self.sinks.len()));
        }
        Ok(())
    }
}
