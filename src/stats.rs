use serde::Serialize;
use std::collections::BTreeMap;

use crate::types::DropReason;

/// Counts of accepted rows and of each reason rows were dropped.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct DropTally {
    pub accepted: usize,
    pub dropped: BTreeMap<&'static str, usize>,
}

impl DropTally {
    pub fn record<T>(&mut self, row: &Result<T, DropReason>) {
        match row {
            Ok(_) => self.accepted += 1,
            Err(reason) => *self.dropped.entry(reason.kind()).or_default() += 1,
        }
    }

    /// All dropped rows, blank lines included.
    pub fn dropped_total(&self) -> usize {
        self.dropped.values().sum()
    }

    pub fn total(&self) -> usize {
        self.accepted + self.dropped_total()
    }

    /// Dropped rows that had content; blank lines are not counted.
    pub fn rejected(&self) -> usize {
        self.dropped_total() - self.count("blank")
    }

    pub fn count(&self, kind: &str) -> usize {
        self.dropped.get(kind).copied().unwrap_or(0)
    }

    /// Share of non-blank rows that became data points.
    pub fn pct_accepted(&self) -> f64 {
        pct(self.accepted, self.accepted + self.rejected())
    }
}

impl<'a, T: 'a> FromIterator<&'a Result<T, DropReason>> for DropTally {
    fn from_iter<I: IntoIterator<Item = &'a Result<T, DropReason>>>(iter: I) -> Self {
        let mut tally = DropTally::default();
        for row in iter {
            tally.record(row);
        }
        tally
    }
}

pub fn pct(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        (part as f64 / total as f64) * 100.0
    }
}
