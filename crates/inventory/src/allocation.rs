use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{AllocationId, DomainError, DomainResult, Entity, ItemId, LocationId, LotId};

/// Opaque reference to the demand an allocation serves (order number, job, ...).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DemandRef(String);

impl DemandRef {
    pub fn new(value: impl Into<String>) -> DomainResult<Self> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("demand reference cannot be empty"));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for DemandRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DemandRef {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A reversible claim on one lot for a demand.
///
/// Created by a successful allocation and deleted on release or consumption;
/// never edited in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub allocation_id: AllocationId,
    pub demand_ref: DemandRef,
    pub item_id: ItemId,
    pub location_id: LocationId,
    pub lot_id: LotId,
    pub quantity_allocated: i64,
    pub allocated_at: DateTime<Utc>,
}

impl Entity for Allocation {
    type Id = AllocationId;

    fn id(&self) -> &Self::Id {
        &self.allocation_id
    }
}

/// Part of an allocation used up by an issue.
///
/// A partial consumption deletes the allocation and puts `residual` in its place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationConsumption {
    pub allocation_id: AllocationId,
    pub lot_id: LotId,
    pub quantity: i64,
    pub residual: Option<Allocation>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demand_ref_is_trimmed_and_non_empty() {
        assert_eq!(DemandRef::new("  SO-1 ").unwrap().as_str(), "SO-1");
        assert!(matches!(DemandRef::new("   "), Err(DomainError::Validation(_))));
    }
}
