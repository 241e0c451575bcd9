//! Property-based tests for collabscore
//!
//! Uses proptest to verify invariants of the score algebra, the robust
//! estimators and the voting rights.

use collabscore::model::squash;
use collabscore::prelude::*;
use proptest::prelude::*;

fn score_strategy() -> impl Strategy<Value = Score> {
    (-100.0..100.0f64, 0.0..10.0f64, 0.0..10.0f64)
        .prop_map(|(value, left, right)| Score::new(value, left, right).unwrap())
}

fn sample_strategy() -> impl Strategy<Value = Sample> {
    prop::collection::vec((-20.0..20.0f64, 0.1..1.0f64, 0.0..2.0f64), 1..30).prop_map(|rows| {
        Sample::from_scores(
            rows.into_iter()
                .map(|(value, weight, unc)| (Score::symmetric(value, unc), weight)),
        )
    })
}

proptest! {
    // ==================== Score Algebra ====================

    #[test]
    fn score_add_then_sub_restores_value(a in score_strategy(), b in score_strategy()) {
        let c = (a + b) - b;
        prop_assert!((c.value() - a.value()).abs() < 1e-9);
        prop_assert!(c.min() <= a.min() + 1e-9);
        prop_assert!(c.max() >= a.max() - 1e-9);
    }

    #[test]
    fn score_negation_is_times_minus_one(a in score_strategy()) {
        let negated = -a;
        let multiplied = -1.0 * a;
        prop_assert!((negated.value() - multiplied.value()).abs() < 1e-9);
        prop_assert!((negated.min() - multiplied.min()).abs() < 1e-9);
        prop_assert!((negated.max() - multiplied.max()).abs() < 1e-9);
    }

    #[test]
    fn score_abs_is_non_negative(a in score_strategy()) {
        let abs = a.abs();
        prop_assert!(abs.value() >= 0.0);
        prop_assert!(abs.min() >= 0.0);
        prop_assert!(abs.max() >= abs.value());
    }

    #[test]
    fn score_contains_its_value(a in score_strategy()) {
        prop_assert!(a.contains(a.value()));
        prop_assert!(a.min() <= a.value() && a.value() <= a.max());
    }

    #[test]
    fn division_by_interval_containing_zero_is_nan(
        a in score_strategy(),
        center in -1.0..1.0f64,
    ) {
        let divisor = Score::symmetric(center, center.abs() + 0.1);
        prop_assert!((a / divisor).is_nan());
    }

    #[test]
    fn squash_is_bounded_and_monotone(x in -1e3..1e3f64, dx in 0.0..10.0f64) {
        let low = squash(Score::certain(x), 100.0);
        let high = squash(Score::certain(x + dx), 100.0);
        prop_assert!(low.value().abs() < 100.0 + 1e-9);
        prop_assert!(low.value() <= high.value());
    }

    // ==================== MultiScore ====================

    #[test]
    fn multiscore_nan_set_is_noop(value in -10.0..10.0f64) {
        let mut table = MultiScore::new(&["entity_name", "criterion"]);
        table.set(&["a", "q"], Score::certain(value)).unwrap();
        table.set(&["a", "q"], Score::nan()).unwrap();
        table.set(&["b", "q"], Score::nan()).unwrap();
        prop_assert_eq!(table.get(&["a", "q"]).value(), value);
        prop_assert!(table.get(&["b", "q"]).is_nan());
    }

    // ==================== Robust Estimators ====================

    #[test]
    fn qr_quantile_is_monotone_in_q(
        sample in sample_strategy(),
        q1 in 0.05..0.95f64,
        dq in 0.0..0.5f64,
    ) {
        let q2 = (q1 + dq).min(0.95);
        let low = qr_quantile(1.0, q1, &sample, 0.0, 1e-8).unwrap();
        let high = qr_quantile(1.0, q2, &sample, 0.0, 1e-8).unwrap();
        prop_assert!(low <= high + 1e-6);
    }

    #[test]
    fn qr_quantile_resists_one_voter(
        sample in sample_strategy(),
        lipschitz in 0.01..10.0f64,
        moved in -1e3..1e3f64,
    ) {
        let before = qr_quantile(lipschitz, 0.2, &sample, 0.0, 1e-8).unwrap();
        let mut perturbed = sample.clone();
        perturbed.values[0] = moved;
        let after = qr_quantile(lipschitz, 0.2, &perturbed, 0.0, 1e-8).unwrap();
        let bound = 2.0 * sample.weights[0] * lipschitz;
        prop_assert!((after - before).abs() <= bound + 1e-6);
    }

    #[test]
    fn qr_quantile_is_translation_equivariant(
        sample in sample_strategy(),
        shift in -50.0..50.0f64,
    ) {
        let base = qr_quantile(1.0, 0.3, &sample, 0.0, 1e-9).unwrap();
        let mut shifted = sample.clone();
        for value in shifted.values.iter_mut() {
            *value += shift;
        }
        let moved = qr_quantile(1.0, 0.3, &shifted, shift, 1e-9).unwrap();
        prop_assert!((moved - base - shift).abs() < 1e-5);
    }

    #[test]
    fn qr_uncertainty_never_exceeds_prior(sample in sample_strategy()) {
        let uncertainty = qr_uncertainty(0.5, &sample, 1.0, 1e-8, None).unwrap();
        prop_assert!(uncertainty > 0.0 && uncertainty <= 1.0);
    }

    #[test]
    fn qr_standard_deviation_is_non_negative(sample in sample_strategy()) {
        let deviation = qr_standard_deviation(0.5, &sample, 0.9, 1.0, 1e-8, None).unwrap();
        prop_assert!(deviation >= 0.0);
    }

    // ==================== Voting Rights ====================

    #[test]
    fn voting_rights_are_bounded_and_balanced(
        raters in prop::collection::vec((0.0..1.0f64, prop::bool::ANY), 1..40),
    ) {
        let assignment = AffineOvertrust::default();
        let raters: Vec<(f64, f64)> = raters
            .into_iter()
            .map(|(trust, public)| (trust, if public { 1.0 } else { 0.5 }))
            .collect();
        let outcome = assignment.entity_voting_rights(&raters).unwrap();
        let total: f64 = outcome.rights.iter().sum();
        let stats = &outcome.stats;

        prop_assert_eq!(outcome.rights.len(), raters.len());
        for &right in &outcome.rights {
            prop_assert!((0.0..=1.0).contains(&right));
        }
        prop_assert!((total - stats.cumulative_trust - stats.overtrust).abs() < 1e-6);
        prop_assert!(stats.overtrust >= -1e-12);
        prop_assert!(
            stats.overtrust <= assignment.maximal_overtrust(stats.cumulative_trust) + 1e-6
        );
        for (&(trust, privacy), &right) in raters.iter().zip(&outcome.rights) {
            prop_assert!(right >= privacy * trust - 1e-12);
        }
    }
}
