use std::collections::BTreeMap;

use chrono::Utc;
use proptest::prelude::*;
use strategos::domain::models::{DecisionArm, PathSource};
use strategos::services::bandit::BanditAlgorithm;
use strategos::services::{BudgetLedger, LinUcb};

const DIM: usize = 4;

#[derive(Debug, Clone)]
enum LedgerOp {
    Reserve { contract: u8, cost: f64, time: f64 },
    Release { contract: u8 },
}

fn ledger_op() -> impl Strategy<Value = LedgerOp> {
    prop_oneof![
        (0u8..6, 0.0f64..8.0, 0.0f64..40.0)
            .prop_map(|(contract, cost, time)| LedgerOp::Reserve { contract, cost, time }),
        (0u8..6).prop_map(|contract| LedgerOp::Release { contract }),
    ]
}

proptest! {
    /// Property: activations always equal successes plus failures
    #[test]
    fn prop_activation_count_is_sum(
        observations in prop::collection::vec((any::<bool>(), 0.0f64..=1.0), 0..80)
    ) {
        let now = Utc::now();
        let mut arm = DecisionArm::new("arm", "analytical", "", PathSource::Static, now);
        for (success, reward) in &observations {
            arm.record(*success, *reward, now);
            prop_assert_eq!(arm.activation_count(), arm.success_count() + arm.failure_count());
        }
        prop_assert_eq!(arm.activation_count(), observations.len() as u64);
    }

    /// Property: usage never exceeds capacity, and double releases never
    /// refund twice
    #[test]
    fn prop_ledger_never_overcommits(ops in prop::collection::vec(ledger_op(), 0..60)) {
        let capacity = BTreeMap::from([
            ("cost_dollars".to_string(), 10.0),
            ("time_seconds".to_string(), 60.0),
        ]);
        let mut ledger = BudgetLedger::new(capacity.clone());
        let now = Utc::now();

        for op in ops {
            match op {
                LedgerOp::Reserve { contract, cost, time } => {
                    let required = BTreeMap::from([
                        ("cost_dollars".to_string(), cost),
                        ("time_seconds".to_string(), time),
                    ]);
                    let _ = ledger.reserve(&format!("c{contract}"), &required, now);
                }
                LedgerOp::Release { contract } => {
                    let id = format!("c{contract}");
                    ledger.release(&id);
                    prop_assert!(ledger.release(&id).is_none());
                }
            }
            for (resource, cap) in &capacity {
                prop_assert!(ledger.used(resource) <= cap + 1e-9);
                prop_assert!(ledger.used(resource) >= -1e-9);
            }
        }

        for contract in 0u8..6 {
            ledger.release(&format!("c{contract}"));
        }
        for resource in capacity.keys() {
            prop_assert!(ledger.used(resource).abs() < 1e-9);
        }
    }
}

/// Property: any sequence of LinUCB fits keeps each design matrix symmetric
/// positive-definite
#[test_strategy::proptest]
fn prop_linucb_design_matrix_spd(
    #[strategy(prop::collection::vec(
        (prop::collection::vec(-1.0f64..1.0, DIM), 0usize..3, 0.0f64..=1.0),
        1..40,
    ))]
    fits: Vec<(Vec<f64>, usize, f64)>,
) {
    let mut bandit = LinUcb::new(DIM, 1.0);
    for (context, arm, reward) in &fits {
        bandit.fit(context, &format!("arm-{arm}"), *reward);
    }
    for id in bandit.arm_ids() {
        let arm = bandit.arm(&id).expect("fitted arm");
        prop_assert!(arm.a.is_symmetric(1e-9));
        prop_assert!(arm.a.is_positive_definite());
    }
}
