//! Typed batch import of stock items.
//!
//! A batch is validated as a whole before anything is written: either every row is
//! acceptable or the caller gets the full list of row errors.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use stockledger_core::{ItemId, LocationId, Money, StockKey};
use stockledger_inventory::ConsumptionPolicy;
use stockledger_planning::ItemProfile;

/// Opening stock for an imported row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpeningStock {
    pub quantity: i64,
    pub unit_cost: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemImportRow {
    pub item_id: ItemId,
    pub location_id: LocationId,
    #[serde(default)]
    pub policy: Option<ConsumptionPolicy>,
    #[serde(default)]
    pub reorder_point: Option<i64>,
    #[serde(default)]
    pub reorder_quantity: Option<i64>,
    #[serde(default)]
    pub opening: Option<OpeningStock>,
    #[serde(default)]
    pub profile: Option<ItemProfile>,
}

impl ItemImportRow {
    pub fn key(&self) -> StockKey {
        StockKey::new(self.item_id, self.location_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    pub row: usize,
    pub message: String,
}

impl core::fmt::Display for RowError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "row {}: {}", self.row, self.message)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemImportBatch {
    pub rows: Vec<ItemImportRow>,
}

/// A batch that passed validation. Only obtainable through [`ItemImportBatch::validate`].
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedBatch {
    rows: Vec<ItemImportRow>,
}

impl ValidatedBatch {
    pub fn rows(&self) -> &[ItemImportRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Outcome of an import run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub provisioned: usize,
    pub reused: usize,
    pub opening_receipts: usize,
    pub profiles: usize,
}

impl ItemImportBatch {
    pub fn validate(self) -> Result<ValidatedBatch, Vec<RowError>> {
        let mut errors = Vec::new();
        let mut seen = HashSet::new();

        for (row, r) in self.rows.iter().enumerate() {
            let mut fail = |message: String| errors.push(RowError { row, message });

            if !seen.insert(r.key()) {
                fail(format!("duplicate stock key {}", r.key()));
            }
            if r.reorder_point.is_some_and(|v| v < 0) || r.reorder_quantity.is_some_and(|v| v < 0) {
                fail("reorder settings cannot be negative".to_string());
            }
            if let Some(opening) = &r.opening {
                if opening.quantity <= 0 {
                    fail(format!("opening quantity must be positive, got {}", opening.quantity));
                }
                if opening.unit_cost.is_negative() {
                    fail("opening unit cost cannot be negative".to_string());
                }
            }
            if let Some(profile) = &r.profile {
                if profile.item_id != r.item_id {
                    fail("profile belongs to a different item".to_string());
                }
                if let Err(e) = profile.validate() {
                    fail(e.to_string());
                }
            }
        }

        if errors.is_empty() {
            Ok(ValidatedBatch { rows: self.rows })
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(item: ItemId, loc: LocationId) -> ItemImportRow {
        ItemImportRow {
            item_id: item,
            location_id: loc,
            policy: None,
            reorder_point: None,
            reorder_quantity: None,
            opening: Some(OpeningStock {
                quantity: 10,
                unit_cost: Money::from_minor(150),
            }),
            profile: None,
        }
    }

    #[test]
    fn collects_every_row_error() {
        let item = ItemId::new();
        let loc = LocationId::new();
        let mut bad_qty = row(ItemId::new(), loc);
        bad_qty.opening = Some(OpeningStock {
            quantity: 0,
            unit_cost: Money::from_minor(-1),
        });

        let batch = ItemImportBatch {
            rows: vec![row(item, loc), row(item, loc), bad_qty],
        };
        let errors = batch.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
        assert_eq!(errors[0].row, 1);
        assert!(errors.iter().filter(|e| e.row == 2).count() == 2);
    }

    #[test]
    fn valid_batch_parses_from_json() {
        let item = ItemId::new();
        let loc = LocationId::new();
        let json = format!(
            r#"{{"rows": [{{"item_id": "{item}", "location_id": "{loc}", "policy": "LIFO",
                "opening": {{"quantity": 4, "unit_cost": 99}}}}]}}"#
        );
        let batch: ItemImportBatch = serde_json::from_str(&json).unwrap();
        let validated = batch.validate().unwrap();
        assert_eq!(validated.len(), 1);
        assert_eq!(validated.rows()[0].policy, Some(ConsumptionPolicy::Lifo));
    }
}
