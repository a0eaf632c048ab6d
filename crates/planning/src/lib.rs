//! Replenishment planning: reorder points, demand statistics, EOQ and ABC classes.
//!
//! Pure computations over journal movements and planning records. Persistence and
//! scheduling live in the infra crate.

pub mod abc;
pub mod demand;
pub mod eoq;
pub mod metrics;
pub mod params;
pub mod recommendation;
pub mod reorder;
pub mod seasonal;
pub mod settings;

pub use abc::{AbcClass, AbcCounts, AbcRecord, AbcSummary, DemandSource, classify};
pub use demand::{DemandStatistics, calculate_demand_statistics, issued_volume};
pub use eoq::{EoqReport, calculate_eoq};
pub use metrics::{PerformanceTally, ReorderPerformance, Stockout, days_of_stock};
pub use params::{ItemProfile, PlanningParams, PlanningParamsPatch};
pub use recommendation::{ReorderRecommendation, estimate_stockout, recommend, suggested_order_quantity, urgency_score};
pub use reorder::{ReorderChange, ReorderReport, compute_reorder_point, is_significant_change, recalculated_reorder_point};
pub use seasonal::{SeasonalAdjustment, SeasonalFactors, seasonal_reorder_point};
pub use settings::{AbcThresholds, PlanningSettings};
