use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{AllocationId, LotId, Money, StockKey};

use crate::allocation::DemandRef;
use crate::stock::ConsumptionPolicy;

/// Command: ProvisionStockItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionStockItem {
    pub key: StockKey,
    pub policy: ConsumptionPolicy,
    pub reorder_point: i64,
    pub reorder_quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReceiveLot.
///
/// `policy_if_new` is used only when the receipt creates the stock item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveLot {
    pub key: StockKey,
    pub lot_id: LotId,
    pub quantity: i64,
    pub unit_cost: Money,
    pub received_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub reference: Option<String>,
    pub policy_if_new: ConsumptionPolicy,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AllocateStock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocateStock {
    pub key: StockKey,
    pub demand_ref: DemandRef,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Which open allocations a release targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReleaseSelector {
    Demand(DemandRef),
    Ids(Vec<AllocationId>),
}

/// Command: ReleaseAllocations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseAllocations {
    pub key: StockKey,
    pub selector: ReleaseSelector,
    pub occurred_at: DateTime<Utc>,
}

/// Command: IssueStock.
///
/// With a `reference`, open allocations for that demand are consumed first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueStock {
    pub key: StockKey,
    pub quantity: i64,
    pub reference: Option<DemandRef>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AdjustStock (cycle count, damage).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustStock {
    pub key: StockKey,
    pub new_quantity: i64,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetPolicy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetPolicy {
    pub key: StockKey,
    pub policy: ConsumptionPolicy,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetReorderPlan. `None` leaves the current value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetReorderPlan {
    pub key: StockKey,
    pub reorder_point: Option<i64>,
    pub reorder_quantity: Option<i64>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerCommand {
    Provision(ProvisionStockItem),
    Receive(ReceiveLot),
    Allocate(AllocateStock),
    Release(ReleaseAllocations),
    Issue(IssueStock),
    Adjust(AdjustStock),
    SetPolicy(SetPolicy),
    SetReorderPlan(SetReorderPlan),
}

impl LedgerCommand {
    pub fn key(&self) -> StockKey {
        match self {
            LedgerCommand::Provision(c) => c.key,
            LedgerCommand::Receive(c) => c.key,
            LedgerCommand::Allocate(c) => c.key,
            LedgerCommand::Release(c) => c.key,
            LedgerCommand::Issue(c) => c.key,
            LedgerCommand::Adjust(c) => c.key,
            LedgerCommand::SetPolicy(c) => c.key,
            LedgerCommand::SetReorderPlan(c) => c.key,
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            LedgerCommand::Provision(_) => "provision",
            LedgerCommand::Receive(_) => "receive",
            LedgerCommand::Allocate(_) => "allocate",
            LedgerCommand::Release(_) => "release",
            LedgerCommand::Issue(_) => "issue",
            LedgerCommand::Adjust(_) => "adjust",
            LedgerCommand::SetPolicy(_) => "set_policy",
            LedgerCommand::SetReorderPlan(_) => "set_reorder_plan",
        }
    }
}
