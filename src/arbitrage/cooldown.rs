//! Probe Cooldown - suppress repeatedly failing probes with escalating backoff
//!
//! A probe whose quotes keep failing (dead pool, reverting router path) would
//! otherwise cost a full retry cycle every tick. After a failure the probe is
//! skipped for a number of ticks that grows 5x per consecutive failure, up to
//! a cap. Any success removes the entry.
//!
//! Escalation: initial -> 5x -> 5x -> cap (e.g. 2 -> 10 -> 50 -> 250 -> 720 ticks)
//! Disabled when `initial_cooldown == 0`.

use std::collections::HashMap;
use tracing::{debug, info};

/// Escalation multiplier per failure (5x each step)
const ESCALATION_FACTOR: u64 = 5;

/// Maximum cooldown cap in ticks (1 hour at the default 5s interval)
pub const DEFAULT_MAX_COOLDOWN_TICKS: u64 = 720;

struct CooldownEntry {
    last_failed_tick: u64,
    cooldown_ticks: u64,
    failure_count: u32,
}

/// Per-probe cooldown tracker, keyed by probe label
pub struct RouteCooldown {
    entries: HashMap<String, CooldownEntry>,
    initial_cooldown: u64,
    max_cooldown: u64,
}

impl RouteCooldown {
    /// `initial_cooldown` = ticks to skip after the first failure (0 = disabled)
    pub fn new(initial_cooldown: u64) -> Self {
        Self::with_cap(initial_cooldown, DEFAULT_MAX_COOLDOWN_TICKS)
    }

    pub fn with_cap(initial_cooldown: u64, max_cooldown: u64) -> Self {
        Self {
            entries: HashMap::new(),
            initial_cooldown,
            max_cooldown: max_cooldown.max(initial_cooldown),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.initial_cooldown > 0
    }

    /// True while the probe should be skipped at `current_tick`
    pub fn is_cooled_down(&self, key: &str, current_tick: u64) -> bool {
        if !self.is_enabled() {
            return false;
        }
        self.entries
            .get(key)
            .map(|entry| current_tick < entry.last_failed_tick + entry.cooldown_ticks + 1)
            .unwrap_or(false)
    }

    /// Record a failure at `tick`. Creates or escalates the cooldown.
    pub fn record_failure(&mut self, key: &str, tick: u64) {
        if !self.is_enabled() {
            return;
        }

        let entry = self.entries.entry(key.to_string()).or_insert(CooldownEntry {
            last_failed_tick: tick,
            cooldown_ticks: 0,
            failure_count: 0,
        });

        entry.failure_count += 1;
        entry.last_failed_tick = tick;

        // initial * 5^(failures-1), capped
        let escalated = self
            .initial_cooldown
            .saturating_mul(ESCALATION_FACTOR.saturating_pow(entry.failure_count.saturating_sub(1)));
        entry.cooldown_ticks = escalated.min(self.max_cooldown);

        debug!(
            "Probe cooldown: {} | fail #{} | skip {} ticks",
            key, entry.failure_count, entry.cooldown_ticks
        );
    }

    /// Record a success; the probe is eligible again immediately
    pub fn record_success(&mut self, key: &str) {
        if self.entries.remove(key).is_some() {
            info!("Probe cooldown reset: {} (evaluation succeeded)", key);
        }
    }

    /// Drop expired entries to bound memory
    pub fn cleanup(&mut self, current_tick: u64) {
        let before = self.entries.len();
        self.entries
            .retain(|_key, entry| current_tick < entry.last_failed_tick + entry.cooldown_ticks + 1);
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!("Probe cooldown cleanup: removed {} expired entries", removed);
        }
    }

    pub fn active_count(&self) -> usize {
        self.entries.len()
    }
}
