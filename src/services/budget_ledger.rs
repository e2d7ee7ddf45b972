//! Global resource budget with per-contract reservations.
//!
//! Every reservation is keyed by the contract that made it and is released
//! exactly once. Reserving checks every resource before committing any, so a
//! rejected reservation leaves the ledger untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::domain::errors::{DecisionError, DecisionResult};
use crate::domain::models::{ActionContract, ContractViolation};

/// Slack allowed when comparing float totals against capacity.
const CAPACITY_EPSILON: f64 = 1e-9;

// ============================================================================
// Supporting types
// ============================================================================

/// Amounts held by one contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub contract_id: String,
    pub amounts: BTreeMap<String, f64>,
    pub reserved_at: DateTime<Utc>,
}

/// Point-in-time view of one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub resource: String,
    pub capacity: f64,
    pub used: f64,
    pub available: f64,
}

/// Whether a set of contracts could all run against the current budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeasibilityReport {
    pub feasible: bool,
    /// Combined demand of all contracts, per budgeted resource.
    pub required: BTreeMap<String, f64>,
    pub shortfalls: Vec<ContractViolation>,
}

// ============================================================================
// BudgetLedger
// ============================================================================

/// Capacity and consumption per resource.
///
/// Resources absent from the global budget are unconstrained and never
/// recorded.
#[derive(Debug, Clone)]
pub struct BudgetLedger {
    capacity: BTreeMap<String, f64>,
    used: BTreeMap<String, f64>,
    reservations: HashMap<String, Reservation>,
}

impl BudgetLedger {
    pub fn new(global_budget: BTreeMap<String, f64>) -> Self {
        let capacity: BTreeMap<String, f64> = global_budget
            .into_iter()
            .map(|(resource, cap)| (resource, if cap.is_finite() { cap.max(0.0) } else { 0.0 }))
            .collect();
        let used = capacity.keys().map(|r| (r.clone(), 0.0)).collect();
        Self {
            capacity,
            used,
            reservations: HashMap::new(),
        }
    }

    pub fn capacity(&self, resource: &str) -> Option<f64> {
        self.capacity.get(resource).copied()
    }

    /// Amount currently reserved; zero for unbudgeted resources.
    pub fn used(&self, resource: &str) -> f64 {
        self.used.get(resource).copied().unwrap_or(0.0)
    }

    /// Remaining capacity, or `None` for an unbudgeted resource.
    pub fn available(&self, resource: &str) -> Option<f64> {
        self.capacity(resource)
            .map(|cap| (cap - self.used(resource)).max(0.0))
    }

    pub fn is_reserved(&self, contract_id: &str) -> bool {
        self.reservations.contains_key(contract_id)
    }

    pub fn reservation(&self, contract_id: &str) -> Option<&Reservation> {
        self.reservations.get(contract_id)
    }

    pub fn reservation_count(&self) -> usize {
        self.reservations.len()
    }

    /// Check `required` against remaining capacity without committing.
    pub fn check(&self, required: &BTreeMap<String, f64>) -> DecisionResult<()> {
        match self.shortfalls(required).into_iter().next() {
            Some(violation) => Err(violation.into()),
            None => Ok(()),
        }
    }

    fn shortfalls(&self, required: &BTreeMap<String, f64>) -> Vec<ContractViolation> {
        required
            .iter()
            .filter_map(|(resource, amount)| {
                let capacity = self.capacity(resource)?;
                let requested = sanitize(*amount);
                let available = (capacity - self.used(resource)).max(0.0);
                // NaN requests compare false and are rejected.
                if requested <= available + CAPACITY_EPSILON {
                    None
                } else {
                    Some(ContractViolation::BudgetExceeded {
                        resource: resource.clone(),
                        requested,
                        available,
                    })
                }
            })
            .collect()
    }

    /// Reserve `required` for `contract_id`, all or nothing.
    pub fn reserve(
        &mut self,
        contract_id: &str,
        required: &BTreeMap<String, f64>,
        now: DateTime<Utc>,
    ) -> DecisionResult<()> {
        if self.reservations.contains_key(contract_id) {
            return Err(DecisionError::DuplicateReservation(contract_id.to_string()));
        }
        if let Err(e) = self.check(required) {
            tracing::debug!(contract_id, error = %e, "budget reservation rejected");
            return Err(e);
        }

        let amounts: BTreeMap<String, f64> = required
            .iter()
            .filter(|(resource, _)| self.capacity.contains_key(*resource))
            .map(|(resource, amount)| (resource.clone(), sanitize(*amount)))
            .collect();
        for (resource, amount) in &amounts {
            *self.used.entry(resource.clone()).or_insert(0.0) += amount;
        }
        self.reservations.insert(
            contract_id.to_string(),
            Reservation {
                contract_id: contract_id.to_string(),
                amounts,
                reserved_at: now,
            },
        );
        tracing::debug!(contract_id, "budget reserved");
        Ok(())
    }

    /// Return a contract's reservation to the pool.
    ///
    /// Releasing an unknown or already released contract is a no-op and
    /// returns `None`.
    pub fn release(&mut self, contract_id: &str) -> Option<Reservation> {
        let reservation = self.reservations.remove(contract_id)?;
        for (resource, amount) in &reservation.amounts {
            if let Some(used) = self.used.get_mut(resource) {
                *used = (*used - amount).max(0.0);
            }
        }
        if self.reservations.is_empty() {
            for used in self.used.values_mut() {
                *used = 0.0;
            }
        }
        tracing::debug!(contract_id, "budget released");
        Some(reservation)
    }

    /// Whether all `contracts` together fit in the remaining budget.
    pub fn feasibility<'a>(
        &self,
        contracts: impl IntoIterator<Item = &'a ActionContract>,
    ) -> FeasibilityReport {
        let mut required: BTreeMap<String, f64> = BTreeMap::new();
        for contract in contracts {
            for (resource, amount) in contract.required_resources() {
                if self.capacity.contains_key(&resource) {
                    *required.entry(resource).or_insert(0.0) += sanitize(amount);
                }
            }
        }
        let shortfalls = self.shortfalls(&required);
        FeasibilityReport {
            feasible: shortfalls.is_empty(),
            required,
            shortfalls,
        }
    }

    pub fn snapshot(&self) -> Vec<ResourceUsage> {
        self.capacity
            .iter()
            .map(|(resource, capacity)| {
                let used = self.used(resource);
                ResourceUsage {
                    resource: resource.clone(),
                    capacity: *capacity,
                    used,
                    available: (capacity - used).max(0.0),
                }
            })
            .collect()
    }
}

/// Negative demands count as zero; NaN is kept so the capacity check rejects it.
fn sanitize(amount: f64) -> f64 {
    if amount < 0.0 {
        0.0
    } else {
        amount
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::reasoning::{COST_RESOURCE, TIME_RESOURCE};

    fn ledger() -> BudgetLedger {
        BudgetLedger::new(BTreeMap::from([
            (COST_RESOURCE.to_string(), 5.0),
            (TIME_RESOURCE.to_string(), 300.0),
        ]))
    }

    fn demand(cost: f64, time: f64) -> BTreeMap<String, f64> {
        BTreeMap::from([
            (COST_RESOURCE.to_string(), cost),
            (TIME_RESOURCE.to_string(), time),
        ])
    }

    #[test]
    fn test_reserve_and_release() {
        let mut ledger = ledger();
        ledger.reserve("c1", &demand(2.0, 100.0), Utc::now()).expect("fits");
        assert!((ledger.used(COST_RESOURCE) - 2.0).abs() < 1e-12);
        assert_eq!(ledger.available(COST_RESOURCE), Some(3.0));

        let released = ledger.release("c1").expect("held");
        assert!((released.amounts[TIME_RESOURCE] - 100.0).abs() < 1e-12);
        assert!(ledger.used(COST_RESOURCE).abs() < f64::EPSILON);
    }

    #[test]
    fn test_over_budget_leaves_ledger_untouched() {
        let mut ledger = ledger();
        let err = ledger
            .reserve("c1", &demand(6.0, 10.0), Utc::now())
            .expect_err("over budget");
        assert!(matches!(err, DecisionError::BudgetExceeded { ref resource, .. } if resource == COST_RESOURCE));
        assert!(ledger.used(COST_RESOURCE).abs() < f64::EPSILON);
        assert!(ledger.used(TIME_RESOURCE).abs() < f64::EPSILON);
        assert!(!ledger.is_reserved("c1"));
    }

    #[test]
    fn test_partial_failure_commits_nothing() {
        let mut ledger = ledger();
        ledger.reserve("c1", &demand(1.0, 250.0), Utc::now()).expect("fits");
        assert!(ledger.reserve("c2", &demand(1.0, 100.0), Utc::now()).is_err());
        assert!((ledger.used(COST_RESOURCE) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut ledger = ledger();
        ledger.reserve("c1", &demand(1.0, 1.0), Utc::now()).expect("fits");
        ledger.reserve("c2", &demand(2.0, 1.0), Utc::now()).expect("fits");
        assert!(ledger.release("c1").is_some());
        assert!(ledger.release("c1").is_none());
        assert!((ledger.used(COST_RESOURCE) - 2.0).abs() < 1e-12);
        assert!(ledger.release("never").is_none());
    }

    #[test]
    fn test_duplicate_reservation_rejected() {
        let mut ledger = ledger();
        ledger.reserve("c1", &demand(1.0, 1.0), Utc::now()).expect("fits");
        assert!(matches!(
            ledger.reserve("c1", &demand(1.0, 1.0), Utc::now()),
            Err(DecisionError::DuplicateReservation(_))
        ));
        assert!((ledger.used(COST_RESOURCE) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_unbudgeted_resources_ignored() {
        let mut ledger = ledger();
        let mut required = demand(1.0, 1.0);
        required.insert("gpu_hours".to_string(), 1e9);
        ledger.reserve("c1", &required, Utc::now()).expect("gpu is unconstrained");
        assert!(ledger.used("gpu_hours").abs() < f64::EPSILON);
        assert!(ledger.available("gpu_hours").is_none());
    }

    #[test]
    fn test_nan_demand_rejected() {
        let mut ledger = ledger();
        assert!(ledger.reserve("c1", &demand(f64::NAN, 1.0), Utc::now()).is_err());
        assert!(ledger.reserve("c2", &demand(-3.0, 1.0), Utc::now()).is_ok());
        assert!(ledger.used(COST_RESOURCE).abs() < f64::EPSILON);
    }

    #[test]
    fn test_feasibility_sums_contracts() {
        let ledger = ledger();
        let mut a = ActionContract::new("a", None);
        a.budget_cost = 3.0;
        let mut b = ActionContract::new("b", None);
        b.budget_cost = 3.0;
        let report = ledger.feasibility([&a, &b]);
        assert!(!report.feasible);
        assert!((report.required[COST_RESOURCE] - 6.0).abs() < 1e-12);
        assert_eq!(report.shortfalls.len(), 1);
        assert!(ledger.feasibility([&a]).feasible);
    }

    #[test]
    fn test_snapshot_lists_every_resource() {
        let mut ledger = ledger();
        ledger.reserve("c1", &demand(1.5, 0.0), Utc::now()).expect("fits");
        let snapshot = ledger.snapshot();
        assert_eq!(snapshot.len(), 2);
        let cost = snapshot.iter().find(|u| u.resource == COST_RESOURCE).expect("cost");
        assert!((cost.available - 3.5).abs() < 1e-12);
    }
}
