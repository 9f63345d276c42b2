//! Per-principal and per-filter delivery statistics.
//!
//! Busy time is tracked with a nesting counter: overlapping deliveries to
//! the same bucket extend one busy interval, and the interval is folded
//! into `aggregate_busy_ms` once, when nesting returns to zero.

use std::collections::HashMap;

use alarmd_core::{FilterKey, Target};
use serde::Serialize;

/// Counters for one bucket (a principal, or one filter of a principal).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BusyCounters {
    pub count: u64,
    pub wakeup_count: u64,
    /// Deliveries currently outstanding for this bucket.
    pub nesting: u32,
    pub aggregate_busy_ms: i64,
    /// When nesting last went 0 → 1 (elapsed millis).
    pub busy_since: i64,
}

impl BusyCounters {
    fn begin(&mut self, wakeup: bool, now: i64) {
        self.count += 1;
        if wakeup {
            self.wakeup_count += 1;
        }
        if self.nesting == 0 {
            self.nesting = 1;
            self.busy_since = now;
        } else {
            self.nesting += 1;
        }
    }

    /// Returns `false` if nesting was already zero.
    fn finish(&mut self, now: i64) -> bool {
        if self.nesting == 0 {
            return false;
        }
        self.nesting -= 1;
        if self.nesting == 0 {
            self.aggregate_busy_ms += (now - self.busy_since).max(0);
        }
        true
    }

    pub fn is_active(&self) -> bool {
        self.nesting > 0
    }
}

/// Everything recorded for one principal.
#[derive(Debug, Clone, Default)]
pub struct PrincipalStats {
    pub totals: BusyCounters,
    pub filters: HashMap<FilterKey, BusyCounters>,
    generation: u64,
}

/// Identifies the ledger entry a delivery was charged to.
///
/// The generation changes whenever a principal's entry is dropped and later
/// recreated, so completions for deliveries charged to the old entry do not
/// touch the new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerKey {
    pub principal: String,
    pub filter: FilterKey,
    generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterSnapshot {
    pub principal: String,
    pub filter: FilterKey,
    pub counters: BusyCounters,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrincipalSnapshot {
    pub principal: String,
    pub totals: BusyCounters,
    /// Sorted by busy time, busiest first.
    pub filters: Vec<FilterSnapshot>,
}

/// Result of charging a completion back to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishResult {
    Recorded,
    /// The principal's entry was dropped after dispatch.
    Detached,
    /// Nesting was already zero somewhere along the way.
    Underflow,
}

#[derive(Debug, Default)]
pub struct StatsLedger {
    principals: HashMap<String, PrincipalStats>,
    next_generation: u64,
}

impl StatsLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Charge a dispatch to `target`'s principal and filter buckets.
    pub fn begin(&mut self, target: &Target, wakeup: bool, now: i64) -> LedgerKey {
        let filter = target.filter_key();
        let next_generation = &mut self.next_generation;
        let stats = self
            .principals
            .entry(target.principal.clone())
            .or_insert_with(|| {
                *next_generation += 1;
                PrincipalStats {
                    generation: *next_generation,
                    ..PrincipalStats::default()
                }
            });

        stats.totals.begin(wakeup, now);
        stats.filters.entry(filter.clone()).or_default().begin(wakeup, now);

        LedgerKey {
            principal: target.principal.clone(),
            filter,
            generation: stats.generation,
        }
    }

    /// Charge a completion.
    pub fn finish(&mut self, key: &LedgerKey, now: i64) -> FinishResult {
        let Some(stats) = self.principals.get_mut(&key.principal) else {
            return FinishResult::Detached;
        };
        if stats.generation != key.generation {
            return FinishResult::Detached;
        }

        let filter_ok = stats
            .filters
            .get_mut(&key.filter)
            .map(|fs| fs.finish(now))
            .unwrap_or(false);
        let total_ok = stats.totals.finish(now);

        if filter_ok && total_ok {
            FinishResult::Recorded
        } else {
            FinishResult::Underflow
        }
    }

    /// Drop everything recorded for `principal` (e.g. on uninstall).
    pub fn remove_principal(&mut self, principal: &str) -> bool {
        self.principals.remove(principal).is_some()
    }

    pub fn principal(&self, principal: &str) -> Option<&PrincipalStats> {
        self.principals.get(principal)
    }

    pub fn filter(&self, principal: &str, filter: &FilterKey) -> Option<&BusyCounters> {
        self.principals.get(principal)?.filters.get(filter)
    }

    pub fn len(&self) -> usize {
        self.principals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.principals.is_empty()
    }

    /// The `n` filters with the most busy time, busiest first.
    pub fn top_filters(&self, n: usize) -> Vec<FilterSnapshot> {
        let mut all: Vec<FilterSnapshot> = self
            .principals
            .iter()
            .flat_map(|(principal, stats)| {
                stats.filters.iter().map(move |(filter, counters)| FilterSnapshot {
                    principal: principal.clone(),
                    filter: filter.clone(),
                    counters: counters.clone(),
                })
            })
            .collect();
        sort_busiest_first(&mut all);
        all.truncate(n);
        all
    }

    /// Per-principal totals with their filters, principals sorted by name.
    pub fn principals(&self) -> Vec<PrincipalSnapshot> {
        let mut out: Vec<PrincipalSnapshot> = self
            .principals
            .iter()
            .map(|(principal, stats)| {
                let mut filters: Vec<FilterSnapshot> = stats
                    .filters
                    .iter()
                    .map(|(filter, counters)| FilterSnapshot {
                        principal: principal.clone(),
                        filter: filter.clone(),
                        counters: counters.clone(),
                    })
                    .collect();
                sort_busiest_first(&mut filters);
                PrincipalSnapshot {
                    principal: principal.clone(),
                    totals: stats.totals.clone(),
                    filters,
                }
            })
            .collect();
        out.sort_by(|a, b| a.principal.cmp(&b.principal));
        out
    }
}

fn sort_busiest_first(filters: &mut [FilterSnapshot]) {
    filters.sort_by(|a, b| {
        b.counters
            .aggregate_busy_ms
            .cmp(&a.counters.aggregate_busy_ms)
            .then_with(|| a.principal.cmp(&b.principal))
            .then_with(|| a.filter.cmp(&b.filter))
    });
}
