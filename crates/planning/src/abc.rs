use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, ItemId, Money};

use crate::settings::AbcThresholds;

/// Priority tier by share of annual consumption value.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AbcClass {
    A,
    B,
    C,
}

impl FromStr for AbcClass {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(Self::A),
            "B" => Ok(Self::B),
            "C" => Ok(Self::C),
            other => Err(DomainError::validation(format!("unknown ABC class '{other}'"))),
        }
    }
}

impl core::fmt::Display for AbcClass {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
        };
        f.write_str(s)
    }
}

/// Where a record's annual demand comes from.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DemandSource {
    /// Trailing annual issue volume, refreshed on every classification pass.
    #[default]
    Journal,
    /// Set explicitly; kept until overwritten.
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbcRecord {
    pub item_id: ItemId,
    pub annual_demand: i64,
    #[serde(default)]
    pub demand_source: DemandSource,
    pub annual_consumption_value: Money,
    /// Unset until the first classification pass after the record is created.
    pub abc_class: Option<AbcClass>,
    pub computed_at: Option<DateTime<Utc>>,
}

impl AbcRecord {
    /// A record with a manually supplied annual demand.
    pub fn new(item_id: ItemId, annual_demand: i64) -> Self {
        Self {
            item_id,
            annual_demand,
            demand_source: DemandSource::Manual,
            annual_consumption_value: Money::ZERO,
            abc_class: None,
            computed_at: None,
        }
    }

    /// A record whose demand tracks the journal.
    pub fn from_journal(item_id: ItemId, annual_demand: i64) -> Self {
        Self {
            demand_source: DemandSource::Journal,
            ..Self::new(item_id, annual_demand)
        }
    }

    pub fn tracks_journal(&self) -> bool {
        self.demand_source == DemandSource::Journal
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbcCounts {
    pub a: usize,
    pub b: usize,
    pub c: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbcSummary {
    pub updated_count: usize,
    pub counts: AbcCounts,
}

/// Reclassify the whole population in place.
///
/// Consumption value is refreshed from `unit_cost`, records are ranked by value
/// descending (item id breaks ties) and assigned A while the cumulative share is at
/// most `a_threshold`, B up to `b_threshold`, C beyond. A zero total puts every item
/// in A. Returned records are in rank order.
pub fn classify(
    records: Vec<AbcRecord>,
    unit_cost: impl Fn(ItemId) -> Money,
    thresholds: &AbcThresholds,
    at: DateTime<Utc>,
) -> (Vec<AbcRecord>, AbcSummary) {
    let mut ranked: Vec<AbcRecord> = records
        .into_iter()
        .map(|mut r| {
            r.annual_consumption_value = unit_cost(r.item_id).times(r.annual_demand.max(0));
            r
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.annual_consumption_value
            .cmp(&a.annual_consumption_value)
            .then_with(|| a.item_id.cmp(&b.item_id))
    });

    let total: i128 = ranked.iter().map(|r| i128::from(r.annual_consumption_value.minor())).sum();
    let mut cumulative: i128 = 0;
    let mut counts = AbcCounts::default();

    for r in &mut ranked {
        cumulative += i128::from(r.annual_consumption_value.minor());
        let share = if total > 0 { cumulative as f64 / total as f64 } else { 0.0 };
        let class = if share <= thresholds.a_threshold {
            counts.a += 1;
            AbcClass::A
        } else if share <= thresholds.b_threshold {
            counts.b += 1;
            AbcClass::B
        } else {
            counts.c += 1;
            AbcClass::C
        };
        r.abc_class = Some(class);
        r.computed_at = Some(at);
    }

    let summary = AbcSummary {
        updated_count: ranked.len(),
        counts,
    };
    (ranked, summary)
}
