//! Property-based tests for the comparators.

use proptest::prelude::*;
use xc_common::MismatchKind;
use xc_core::compare::{compare_ordering, compare_scalars, compare_tables, CompareOptions, ScalarCheck};
use xc_frame::PredictionTable;
use xc_math::DiffMeasure;

fn table(values: &[f64]) -> PredictionTable {
    PredictionTable::from_values("lp", values.iter().copied())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// A table always agrees with itself, at zero tolerance.
    #[test]
    fn table_matches_itself(values in prop::collection::vec(-1e6..1e6f64, 1..60)) {
        let t = table(&values);
        let result = compare_tables(&t, &t, &CompareOptions::default().with_tolerance(0.0)).unwrap();
        prop_assert!(result.passed);
        prop_assert_eq!(result.rows_compared, values.len());
        prop_assert_eq!(result.max_discrepancy, 0.0);
    }

    /// One perturbed cell beyond tolerance is found and located.
    #[test]
    fn single_perturbation_is_located(
        values in prop::collection::vec(-100.0..100.0f64, 1..60),
        pick in any::<prop::sample::Index>(),
        delta in 1e-3..1.0f64,
    ) {
        let row = pick.index(values.len());
        let mut shifted = values.clone();
        shifted[row] += delta;

        let options = CompareOptions::default()
            .with_measure(DiffMeasure::Absolute)
            .with_tolerance(1e-6);
        let result = compare_tables(&table(&values), &table(&shifted), &options).unwrap();
        prop_assert!(!result.passed);
        prop_assert_eq!(result.failures, 1);
        let worst = result.worst.unwrap();
        prop_assert_eq!(worst.kind, MismatchKind::Value);
        prop_assert_eq!(worst.row, Some(row));
    }

    /// Sampling partitions the rows into compared and skipped.
    #[test]
    fn sampling_accounts_for_every_row(
        values in prop::collection::vec(-1.0..1.0f64, 1..200),
        p in 0.01..1.0f64,
        seed in any::<u64>(),
    ) {
        let t = table(&values);
        let options = CompareOptions::default().with_sampling(p, seed);
        let result = compare_tables(&t, &t, &options).unwrap();
        prop_assert_eq!(result.rows_compared + result.rows_skipped, values.len());

        let again = compare_tables(&t, &t, &options).unwrap();
        prop_assert_eq!(again.rows_compared, result.rows_compared);
    }

    /// One-sided checks never fail a candidate at or below the reference.
    #[test]
    fn not_worse_accepts_improvement(reference in -10.0..10.0f64, gain in 0.0..5.0f64) {
        let check = ScalarCheck::new("deviance_ratio", reference - gain, reference, 0.0).not_worse();
        prop_assert!(compare_scalars(&check).passed);
    }

    /// Any strictly increasing transform preserves the ordering exactly.
    #[test]
    fn monotone_transform_keeps_ordering(values in prop::collection::vec(-5.0..5.0f64, 3..80)) {
        let transformed: Vec<f64> = values.iter().map(|v| v.exp()).collect();
        let result = compare_ordering(&table(&values), &table(&transformed), "lp", 0.999).unwrap();
        prop_assert!(result.passed, "{}", result.summary_line());
    }
}
