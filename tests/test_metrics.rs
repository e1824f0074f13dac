use burnscar::core::metrics::confusion_and_metrics;
use burnscar::types::BurnSeverity;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_labels(rng: &mut StdRng, n: usize, classes: &[i64]) -> Vec<i64> {
    (0..n).map(|_| classes[rng.gen_range(0..classes.len())]).collect()
}

#[test]
fn test_totals_match_label_counts() {
    let mut rng = StdRng::seed_from_u64(2018);
    for _ in 0..20 {
        let n = rng.gen_range(0..500);
        let reference = random_labels(&mut rng, n, &[1, 2, 3, 4, 5]);
        let predicted = random_labels(&mut rng, n, &[1, 2, 3, 4, 5]);
        let (cm, metrics) = confusion_and_metrics(&reference, &predicted);

        let correct = reference.iter().zip(&predicted).filter(|(a, b)| a == b).count() as u64;
        assert_eq!(cm.correct(), correct);
        assert_eq!(cm.total(), n as u64);

        for (i, class) in BurnSeverity::ALL.iter().enumerate() {
            let code = class.code();
            assert_eq!(cm.row_totals()[i], reference.iter().filter(|&&v| v == code).count() as u64);
            assert_eq!(cm.column_totals()[i], predicted.iter().filter(|&&v| v == code).count() as u64);
        }

        assert_eq!(metrics.rows.len(), 5);
        for row in &metrics.rows {
            for value in [row.precision, row.recall, row.f1] {
                assert!(value.is_finite() && (0.0..=100.0).contains(&value));
                assert_eq!((value * 100.0).round() / 100.0, value);
            }
        }
    }
}

#[test]
fn test_absent_classes_are_zero_not_nan() {
    let reference = vec![1, 1, 2, 2, 2];
    let predicted = vec![1, 2, 2, 2, 1];
    let (cm, metrics) = confusion_and_metrics(&reference, &predicted);

    for class in [BurnSeverity::Low, BurnSeverity::Moderate, BurnSeverity::High] {
        let row = metrics.get(class).unwrap();
        assert_eq!((row.precision, row.recall, row.f1), (0.0, 0.0, 0.0));
        assert!(metrics.degenerate_classes.contains(&class));
    }

    let growth = metrics.get(BurnSeverity::VegetationGrowth).unwrap();
    assert_eq!(growth.precision, 50.0);
    assert_eq!(growth.recall, 50.0);
    assert_eq!(growth.f1, 50.0);

    let unburned = metrics.get(BurnSeverity::Unburned).unwrap();
    assert_eq!(unburned.precision, 66.67);
    assert_eq!(unburned.recall, 66.67);
    assert_eq!(cm.correct(), 3);
}

#[test]
fn test_perfect_agreement() {
    let labels = vec![1, 2, 3, 4, 5, 5, 4];
    let (cm, metrics) = confusion_and_metrics(&labels, &labels);
    assert_eq!(cm.correct(), labels.len() as u64);
    assert!(metrics.degenerate_classes.is_empty());
    assert!(metrics.rows.iter().all(|r| r.precision == 100.0 && r.recall == 100.0 && r.f1 == 100.0));
}
