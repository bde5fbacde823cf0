//! Disclosure-risk and homogeneity metrics over an equivalence class index.
//!
//! Everything here is read-only. An empty table yields `k_min = 0` and `NaN`
//! for averages and percentages; a sensitive column that is absent from the
//! table yields an empty l-table and zero violations.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Deserializer, Serialize};

use crate::{ClassKey, EquivalenceClassIndex, Table, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LDiversityEntry {
    pub key: ClassKey,
    pub size: usize,
    /// Distinct non-missing sensitive values in the class.
    pub l: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    pub total_records: usize,
    pub class_count: usize,
    pub k_threshold: usize,
    pub k_min: usize,
    /// Classes of size exactly one.
    pub k1_count: usize,
    /// Class size -> number of classes of that size.
    pub k_distribution: BTreeMap<usize, usize>,
    /// Records sitting in a class of size one.
    pub unique_record_count: usize,
    pub small_class_record_count: usize,
    /// Record-weighted mean of `1 / class size`. `NaN` for an empty table,
    /// written as `null` in JSON.
    #[serde(deserialize_with = "nan_from_null")]
    pub avg_individual_risk: f64,
    pub l_table: Vec<LDiversityEntry>,
    pub l_min: Option<usize>,
    pub l_violations: usize,
}

impl RiskMetrics {
    pub fn unique_pct(&self) -> f64 {
        pct(self.unique_record_count, self.total_records)
    }

    pub fn small_pct(&self) -> f64 {
        pct(self.small_class_record_count, self.total_records)
    }

    pub fn avg_risk_pct(&self) -> f64 {
        self.avg_individual_risk * 100.0
    }
}

fn nan_from_null<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

fn pct(n: usize, total: usize) -> f64 {
    if total == 0 {
        return f64::NAN;
    }
    n as f64 / total as f64 * 100.0
}

/// Compute k- and l-metrics for `index`, which must have been built from `table`.
pub fn risk_metrics(
    table: &Table,
    index: &EquivalenceClassIndex,
    k_threshold: usize,
    sensitive_attr: Option<&str>,
) -> RiskMetrics {
    let mut k_distribution: BTreeMap<usize, usize> = BTreeMap::new();
    for class in index.classes() {
        *k_distribution.entry(class.size()).or_insert(0) += 1;
    }
    let k1_count = k_distribution.get(&1).copied().unwrap_or(0);

    let sizes = index.record_sizes();
    let unique_record_count = sizes.iter().filter(|&&s| s == 1).count();
    let small_class_record_count = sizes.iter().filter(|&&s| s < k_threshold).count();
    let avg_individual_risk = if sizes.is_empty() {
        f64::NAN
    } else {
        sizes.iter().map(|&s| 1.0 / s as f64).sum::<f64>() / sizes.len() as f64
    };

    let l_table = sensitive_attr
        .and_then(|name| table.column_index(name))
        .map(|col| l_diversity_table(table, index, col))
        .unwrap_or_default();
    let scored: Vec<&LDiversityEntry> = l_table.iter().filter(|e| e.l > 0).collect();
    let l_min = scored.iter().map(|e| e.l).min();
    let l_violations = scored.iter().filter(|e| e.l < 2).count();

    RiskMetrics {
        total_records: index.record_count(),
        class_count: index.class_count(),
        k_threshold,
        k_min: index.min_size().unwrap_or(0),
        k1_count,
        k_distribution,
        unique_record_count,
        small_class_record_count,
        avg_individual_risk,
        l_table,
        l_min,
        l_violations,
    }
}

/// Per-class count of distinct non-missing values in column `sensitive_col`.
pub fn l_diversity_table(
    table: &Table,
    index: &EquivalenceClassIndex,
    sensitive_col: usize,
) -> Vec<LDiversityEntry> {
    index
        .classes()
        .map(|class| {
            let distinct: BTreeSet<&Value> = class
                .members
                .iter()
                .map(|&row| table.value(row, sensitive_col))
                .filter(|v| !v.is_missing())
                .collect();
            LDiversityEntry {
                key: class.key.clone(),
                size: class.size(),
                l: distinct.len(),
            }
        })
        .collect()
}

/// A class in which one sensitive value holds at least the dominance share.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DominantGroup {
    pub key: ClassKey,
    pub value: Value,
    pub count: usize,
    pub size: usize,
    pub ratio: f64,
}

/// Groups whose share of a single sensitive value is `>= threshold`,
/// sorted by share, highest first. Missing sensitive values count toward the
/// class size but are never reported as the dominant value.
pub fn homogeneous_groups(
    table: &Table,
    index: &EquivalenceClassIndex,
    sensitive_col: usize,
    threshold: f64,
) -> Vec<DominantGroup> {
    let mut out = Vec::new();
    for class in index.classes() {
        let mut counts: BTreeMap<&Value, usize> = BTreeMap::new();
        for &row in class.members {
            let v = table.value(row, sensitive_col);
            if !v.is_missing() {
                *counts.entry(v).or_insert(0) += 1;
            }
        }
        let size = class.size();
        for (value, count) in counts {
            let ratio = count as f64 / size as f64;
            if ratio >= threshold {
                out.push(DominantGroup {
                    key: class.key.clone(),
                    value: value.clone(),
                    count,
                    size,
                    ratio,
                });
            }
        }
    }
    // stable: ties keep key order
    out.sort_by(|a, b| b.ratio.total_cmp(&a.ratio));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn table(rows: &[(&str, &str)]) -> Table {
        let rows = rows
            .iter()
            .map(|(qi, party)| {
                let party = if party.is_empty() {
                    Value::Missing
                } else {
                    Value::text(*party)
                };
                vec![Value::text(*qi), party]
            })
            .collect();
        Table::from_rows(["sex", "party"], rows).unwrap()
    }

    #[test]
    fn risk_is_record_weighted() {
        // one singleton and one class of three
        let t = table(&[("F", "Red"), ("M", "Red"), ("M", "Green"), ("M", "Red")]);
        let idx = EquivalenceClassIndex::build(&t, &["sex"]).unwrap();
        let m = risk_metrics(&t, &idx, 3, Some("party"));
        // (1 + 3 * 1/3) / 4
        assert_abs_diff_eq!(m.avg_individual_risk, 0.5, epsilon = 1e-12);
        assert_eq!(m.k_min, 1);
        assert_eq!(m.k1_count, 1);
        assert_eq!(m.unique_record_count, 1);
        assert_eq!(m.small_class_record_count, 1);
        assert_eq!(m.k_distribution, BTreeMap::from([(1, 1), (3, 1)]));
        assert_eq!(m.l_min, Some(1));
        assert_eq!(m.l_violations, 1);
        assert_abs_diff_eq!(m.unique_pct(), 25.0, epsilon = 1e-12);
    }

    #[test]
    fn missing_sensitive_values_are_not_distinct() {
        let t = table(&[("F", ""), ("F", ""), ("M", "Red"), ("M", "")]);
        let idx = EquivalenceClassIndex::build(&t, &["sex"]).unwrap();
        let m = risk_metrics(&t, &idx, 2, Some("party"));
        assert_eq!(m.l_table[0].l, 0);
        assert_eq!(m.l_table[1].l, 1);
        // the all-missing class is not scored
        assert_eq!(m.l_violations, 1);
        assert_eq!(m.l_min, Some(1));
    }

    #[test]
    fn empty_table_and_absent_sensitive_column() {
        let t = Table::new(["sex", "party"]);
        let idx = EquivalenceClassIndex::build(&t, &["sex"]).unwrap();
        let m = risk_metrics(&t, &idx, 3, Some("religion"));
        assert_eq!(m.k_min, 0);
        assert!(m.avg_individual_risk.is_nan());
        assert!(m.small_pct().is_nan());
        assert!(m.l_table.is_empty());
        assert_eq!(m.l_min, None);
        assert_eq!(m.l_violations, 0);
    }

    #[test]
    fn empty_risk_survives_json() {
        let t = Table::new(["sex"]);
        let idx = EquivalenceClassIndex::build(&t, &["sex"]).unwrap();
        let json = serde_json::to_string(&risk_metrics(&t, &idx, 3, None)).unwrap();
        assert!(json.contains(r#""avg_individual_risk":null"#));
        let back: RiskMetrics = serde_json::from_str(&json).unwrap();
        assert!(back.avg_individual_risk.is_nan());
        assert_eq!(back.k_min, 0);
    }

    #[test]
    fn dominance_report_sorted_by_share() {
        let t = table(&[
            ("F", "Red"),
            ("F", "Red"),
            ("F", "Red"),
            ("F", "Green"),
            ("M", "Green"),
            ("M", "Green"),
        ]);
        let idx = EquivalenceClassIndex::build(&t, &["sex"]).unwrap();
        let groups = homogeneous_groups(&t, &idx, 1, 0.75);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].value, Value::text("Green"));
        assert_abs_diff_eq!(groups[0].ratio, 1.0, epsilon = 1e-12);
        assert_eq!(groups[1].value, Value::text("Red"));
        assert_eq!((groups[1].count, groups[1].size), (3, 4));
    }
}
