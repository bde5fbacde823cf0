use approx::assert_abs_diff_eq;
use medi_sdc::{
    homogeneous_groups, l_diversity_table, risk_metrics, EquivalenceClassIndex, SdcError, Table,
    Value,
};
use proptest::prelude::*;

#[path = "util/fixtures.rs"]
mod fixtures;

use fixtures::{arb_survey, load_survey, PUBLIC_QIS};

fn class_snapshot(index: &EquivalenceClassIndex) -> Vec<(Vec<Value>, Vec<usize>)> {
    index
        .classes()
        .map(|c| (c.key.clone(), c.members.to_vec()))
        .collect()
}

#[test]
fn fixture_classes_cover_every_record() {
    let table = load_survey();
    let index = EquivalenceClassIndex::build(&table, &PUBLIC_QIS).expect("index");
    assert_eq!(index.record_count(), 80);
    let total: usize = index.classes().map(|c| c.size()).sum();
    assert_eq!(total, table.len());
    for class in index.classes() {
        for &row in class.members {
            assert_eq!(index.record_size(row), class.size());
            assert_eq!(&table.project(row, index.columns()), class.key);
        }
    }
}

#[test]
fn missing_evote_forms_its_own_class() {
    let rows = vec![
        vec!["Male".into(), Value::Missing],
        vec!["Male".into(), Value::Missing],
        vec!["Male".into(), Value::Code(1)],
    ];
    let table = Table::from_rows(["sex", "evote"], rows).unwrap();
    let index = EquivalenceClassIndex::build(&table, &["sex", "evote"]).unwrap();
    assert_eq!(index.class_count(), 2);
    assert_eq!(index.size_of(&[Value::text("Male"), Value::Missing]), 2);
    // missing sorts ahead of codes
    let first = index.classes().next().unwrap();
    assert_eq!(first.key[1], Value::Missing);
}

#[test]
fn unknown_quasi_identifier_is_reported() {
    let table = load_survey();
    let err = EquivalenceClassIndex::build(&table, &["sex", "region"]).unwrap_err();
    assert!(matches!(err, SdcError::MissingColumn(c) if c == "region"));
}

#[test]
fn attacker_view_is_at_least_as_risky_as_public_view() {
    let table = load_survey();
    let public = EquivalenceClassIndex::build(&table, &PUBLIC_QIS).unwrap();
    let attacker = EquivalenceClassIndex::build(
        &table,
        &["sex", "age_group", "marital_status", "evote", "education"],
    )
    .unwrap();
    let m_public = risk_metrics(&table, &public, 3, Some("party"));
    let m_attacker = risk_metrics(&table, &attacker, 3, Some("party"));
    assert!(m_attacker.class_count >= m_public.class_count);
    assert!(m_attacker.avg_individual_risk >= m_public.avg_individual_risk);
    assert!(m_attacker.unique_record_count >= m_public.unique_record_count);
}

#[test]
fn metrics_agree_with_the_index() {
    let table = load_survey();
    let index = EquivalenceClassIndex::build(&table, &PUBLIC_QIS).unwrap();
    let m = risk_metrics(&table, &index, 3, Some("party"));

    assert_eq!(m.total_records, 80);
    assert_eq!(m.class_count, index.class_count());
    assert_eq!(Some(m.k_min), index.min_size());
    assert_eq!(m.k_distribution.values().sum::<usize>(), m.class_count);
    assert_eq!(m.k1_count, m.k_distribution.get(&1).copied().unwrap_or(0));
    assert_eq!(m.unique_record_count, m.k1_count);

    let expected_risk =
        index.record_sizes().iter().map(|&s| 1.0 / s as f64).sum::<f64>() / 80.0;
    assert_abs_diff_eq!(m.avg_individual_risk, expected_risk, epsilon = 1e-12);
    // class-weighted: each class contributes size * (1 / size)
    assert_abs_diff_eq!(
        m.avg_individual_risk,
        m.class_count as f64 / 80.0,
        epsilon = 1e-12
    );

    let small: usize = index
        .classes()
        .filter(|c| c.size() < 3)
        .map(|c| c.size())
        .sum();
    assert_eq!(m.small_class_record_count, small);
    assert_abs_diff_eq!(m.small_pct(), small as f64 / 80.0 * 100.0, epsilon = 1e-9);
}

#[test]
fn l_violations_ignore_classes_without_sensitive_values() {
    let rows = vec![
        vec!["a".into(), "Red".into()],
        vec!["a".into(), "Green".into()],
        vec!["b".into(), "Red".into()],
        vec!["b".into(), Value::Missing],
        vec!["c".into(), Value::Missing],
    ];
    let table = Table::from_rows(["age_group", "party"], rows).unwrap();
    let index = EquivalenceClassIndex::build(&table, &["age_group"]).unwrap();
    let l: Vec<usize> = l_diversity_table(&table, &index, 1)
        .iter()
        .map(|e| e.l)
        .collect();
    assert_eq!(l, vec![2, 1, 0]);
    let m = risk_metrics(&table, &index, 2, Some("party"));
    assert_eq!(m.l_violations, 1);
    assert_eq!(m.l_min, Some(1));
}

#[test]
fn homogeneity_report_orders_by_share() {
    let rows = vec![
        vec!["a".into(), "Red".into()],
        vec!["a".into(), "Red".into()],
        vec!["a".into(), "Red".into()],
        vec!["a".into(), "Red".into()],
        vec!["a".into(), "Green".into()],
        vec!["b".into(), "Green".into()],
        vec!["b".into(), "Green".into()],
        vec!["c".into(), "Red".into()],
        vec!["c".into(), "Green".into()],
    ];
    let table = Table::from_rows(["age_group", "party"], rows).unwrap();
    let index = EquivalenceClassIndex::build(&table, &["age_group"]).unwrap();
    let groups = homogeneous_groups(&table, &index, 1, 0.8);
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].key, vec![Value::text("b")]);
    assert_abs_diff_eq!(groups[0].ratio, 1.0);
    assert_eq!(groups[1].key, vec![Value::text("a")]);
    assert_eq!(groups[1].value, Value::text("Red"));
    assert_eq!((groups[1].count, groups[1].size), (4, 5));
}

#[test]
fn empty_table_has_defined_metrics() {
    let table = Table::new(["sex", "party"]);
    let index = EquivalenceClassIndex::build(&table, &["sex"]).unwrap();
    let m = risk_metrics(&table, &index, 3, Some("party"));
    assert_eq!(m.k_min, 0);
    assert_eq!(m.class_count, 0);
    assert!(m.avg_individual_risk.is_nan());
    assert!(m.unique_pct().is_nan());
    assert_eq!(m.l_min, None);
}

proptest! {
    #[test]
    fn rebuilding_the_index_is_idempotent(table in arb_survey(40)) {
        let first = EquivalenceClassIndex::build(&table, &PUBLIC_QIS).unwrap();
        let second = EquivalenceClassIndex::build(&table, &PUBLIC_QIS).unwrap();
        prop_assert_eq!(class_snapshot(&first), class_snapshot(&second));
        prop_assert_eq!(first.record_sizes(), second.record_sizes());
    }

    #[test]
    fn class_sizes_partition_the_table(table in arb_survey(40)) {
        let index = EquivalenceClassIndex::build(&table, &PUBLIC_QIS).unwrap();
        let total: usize = index.classes().map(|c| c.size()).sum();
        prop_assert_eq!(total, table.len());
        prop_assert!(index.classes().all(|c| c.size() > 0));
    }
}
