//! l-diversity repair for a binary sensitive attribute.
//!
//! Homogeneous classes are first fixed in pairs by exchanging one value of
//! each kind, which leaves the global counts untouched. Classes left over
//! when the two kinds are unbalanced get a single flip each, bounded by
//! `max_flips`. Values outside the declared pair are ignored.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{EquivalenceClassIndex, SdcConfig, SdcError, Table, Value};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairReport {
    pub swap_count: usize,
    pub flip_count: usize,
    pub homogeneous_before: usize,
    pub homogeneous_after: usize,
    /// Classes passed over for lack of a record to change.
    pub skipped: usize,
}

/// Rows holding the class's only sensitive value, for each homogeneous class.
#[derive(Debug, Default)]
struct Homogeneous {
    first_only: Vec<Vec<usize>>,
    second_only: Vec<Vec<usize>>,
}

impl Homogeneous {
    fn len(&self) -> usize {
        self.first_only.len() + self.second_only.len()
    }
}

pub struct DiversityRepairer {
    quasi_identifiers: Vec<String>,
    sensitive: String,
    domain: [Value; 2],
    max_swaps: usize,
    max_flips: usize,
}

impl DiversityRepairer {
    pub fn new<S: AsRef<str>>(
        quasi_identifiers: &[S],
        sensitive: &str,
        domain: [Value; 2],
        max_swaps: usize,
        max_flips: usize,
    ) -> Self {
        Self {
            quasi_identifiers: quasi_identifiers
                .iter()
                .map(|q| q.as_ref().to_string())
                .collect(),
            sensitive: sensitive.to_string(),
            domain,
            max_swaps,
            max_flips,
        }
    }

    pub fn from_config(config: &SdcConfig) -> Self {
        Self::new(
            &config.quasi_identifiers,
            &config.sensitive_attribute,
            config.sensitive_domain.clone(),
            config.max_swaps,
            config.max_flips,
        )
    }

    pub fn repair(&self, table: &mut Table, rng: &mut impl Rng) -> Result<RepairReport, SdcError> {
        let qi_cols = self
            .quasi_identifiers
            .iter()
            .map(|q| table.require_column(q))
            .collect::<Result<Vec<_>, _>>()?;
        let col = table.require_column(&self.sensitive)?;
        let [first, second] = &self.domain;
        let mut report = RepairReport::default();

        let before = self.homogeneous(table, &qi_cols, col);
        report.homogeneous_before = before.len();

        let pairs = before
            .first_only
            .len()
            .min(before.second_only.len())
            .min(self.max_swaps);
        for (rows_a, rows_b) in before
            .first_only
            .iter()
            .zip(&before.second_only)
            .take(pairs)
        {
            let picked_a = rows_a.choose(rng).copied();
            let picked_b = rows_b.choose(rng).copied();
            let (Some(ra), Some(rb)) = (picked_a, picked_b) else {
                report.skipped += 1;
                continue;
            };
            table.set_value(ra, col, second.clone());
            table.set_value(rb, col, first.clone());
            report.swap_count += 1;
        }

        let remaining = self.homogeneous(table, &qi_cols, col);
        let targets = remaining
            .first_only
            .iter()
            .map(|rows| (rows, second))
            .chain(remaining.second_only.iter().map(|rows| (rows, first)));
        for (rows, opposite) in targets {
            if report.flip_count >= self.max_flips {
                break;
            }
            match rows.choose(rng) {
                Some(&row) => {
                    table.set_value(row, col, opposite.clone());
                    report.flip_count += 1;
                }
                None => report.skipped += 1,
            }
        }

        report.homogeneous_after = self.homogeneous(table, &qi_cols, col).len();
        log::info!(
            "l-diversity repair on '{}': swaps={}, flips={}, homogeneous classes {} -> {}",
            self.sensitive,
            report.swap_count,
            report.flip_count,
            report.homogeneous_before,
            report.homogeneous_after
        );
        Ok(report)
    }

    fn homogeneous(&self, table: &Table, qi_cols: &[usize], col: usize) -> Homogeneous {
        let [first, second] = &self.domain;
        let index = EquivalenceClassIndex::from_columns(table, qi_cols);
        let mut out = Homogeneous::default();
        for class in index.classes() {
            let rows_with = |target: &Value| -> Vec<usize> {
                class
                    .members
                    .iter()
                    .copied()
                    .filter(|&row| table.value(row, col) == target)
                    .collect()
            };
            let with_first = rows_with(first);
            let with_second = rows_with(second);
            match (with_first.is_empty(), with_second.is_empty()) {
                (false, true) => out.first_only.push(with_first),
                (true, false) => out.second_only.push(with_second),
                _ => {}
            }
        }
        out
    }
}
