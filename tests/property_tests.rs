//! Property-based tests for runtime-sweep
//!
//! - Decoder invariants over arbitrary well-formed reports
//! - Aggregation column shape over arbitrary sweeps
//! - Run with ProptestConfig::with_cases(100)

use proptest::prelude::*;
use runtime_sweep::aggregate::aggregate;
use runtime_sweep::axis::SweepAxis;
use runtime_sweep::decode::{decode, Record};
use runtime_sweep::engine::SubjectRecords;
use runtime_sweep::subject::SubjectRef;

// ============================================================================
// Property Test Generators (Strategies)
// ============================================================================

/// Distinct metric keys with values that may themselves contain `:`
fn arb_report() -> impl Strategy<Value = Vec<(String, String)>> {
    proptest::collection::btree_map("[a-z][a-z0-9_]{0,11}", "[0-9][0-9.:a-z]{0,9}", 0..16)
        .prop_map(|m| m.into_iter().collect())
}

/// Number of axis points and metric values per subject
fn arb_sweep() -> impl Strategy<Value = (usize, Vec<Vec<f64>>)> {
    (1usize..12).prop_flat_map(|points| {
        (
            Just(points),
            proptest::collection::vec(
                proptest::collection::vec(0.0f64..1.0e9, points),
                1..6,
            ),
        )
    })
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: one entry per non-blank line, values split at the first `:`
    #[test]
    fn prop_decode_one_entry_per_line(
        pairs in arb_report(),
        blank_every in 1usize..5,
        pad in "[ \t]{0,3}",
    ) {
        let mut raw = String::new();
        for (i, (k, v)) in pairs.iter().enumerate() {
            if i % blank_every == 0 {
                raw.push('\n');
            }
            raw.push_str(&format!("{pad}{k}{pad}:{pad}{v}{pad}\n"));
        }

        let record = decode(&raw).unwrap();
        prop_assert_eq!(record.len(), pairs.len());
        for (k, v) in &pairs {
            prop_assert_eq!(record.get(k), Some(v.as_str()));
        }
    }

    /// Property: a line without `:` is always rejected with its line number
    #[test]
    fn prop_decode_rejects_separatorless_line(
        pairs in arb_report(),
        junk in "[a-z ]{1,12}",
    ) {
        prop_assume!(!junk.trim().is_empty());
        let mut raw: String = pairs.iter().map(|(k, v)| format!("{k}: {v}\n")).collect();
        raw.push_str(&junk);

        let err = decode(&raw).unwrap_err();
        prop_assert_eq!(err.line, pairs.len() + 1);
    }

    /// Property: aggregation yields one equal-length column per subject,
    /// in subject order, with values untouched
    #[test]
    fn prop_aggregate_columns_align((points, values) in arb_sweep()) {
        let axis = SweepAxis::new("n", (0..points).map(|i| i as i64)).unwrap();
        let series: Vec<SubjectRecords> = values
            .iter()
            .enumerate()
            .map(|(s, column)| SubjectRecords {
                subject: SubjectRef::new(format!("variant_{s}"), "bench"),
                records: column
                    .iter()
                    .map(|v| [("time_ms", v.to_string())].into_iter().collect::<Record>())
                    .collect(),
            })
            .collect();

        let table = aggregate(&axis, &series, "time_ms").unwrap();
        prop_assert_eq!(table.num_columns(), values.len());
        for (s, column) in values.iter().enumerate() {
            prop_assert_eq!(table.columns()[s].label(), format!("variant_{s}"));
            prop_assert_eq!(table.columns()[s].values(), column.as_slice());
        }
    }

    /// Property: scaling is a per-value multiplication
    #[test]
    fn prop_scaled_multiplies((points, values) in arb_sweep(), factor in 1.0e-6f64..1.0e3) {
        let axis = SweepAxis::new("n", (0..points).map(|i| i as i64)).unwrap();
        let mut table = runtime_sweep::table::ResultTable::new(axis);
        for (s, column) in values.iter().enumerate() {
            table.push_column(format!("v{s}"), column.clone()).unwrap();
        }
        let scaled = table.clone().scaled(factor);
        for (a, b) in table.columns().iter().zip(scaled.columns()) {
            for (x, y) in a.values().iter().zip(b.values()) {
                prop_assert!((x * factor - y).abs() <= f64::EPSILON * y.abs().max(1.0));
            }
        }
    }
}
