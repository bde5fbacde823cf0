//! Iterative k-anonymity enforcement.
//!
//! Each round recomputes the equivalence classes and hands every class below
//! `k` to the remedies in priority order, re-indexing between remedies. After
//! the round budget, whatever still violates `k` is deleted outright, so the
//! returned table always satisfies k-anonymity over the quasi-identifiers.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{ClassKey, EquivalenceClassIndex, SdcConfig, SdcError, Table, Value};

/// Column layout of the published quasi-identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QiLayout {
    /// Table column of each quasi-identifier, in key order.
    pub qi_cols: Vec<usize>,
    /// Position of the suppressible attribute inside a class key, if published.
    pub suppressible: Option<usize>,
    /// Position of the coarsenable attribute inside a class key.
    pub coarsenable: usize,
}

impl QiLayout {
    pub fn resolve<S: AsRef<str>>(
        table: &Table,
        quasi_identifiers: &[S],
        suppressible: &str,
        coarsenable: &str,
    ) -> Result<Self, SdcError> {
        let qi_cols = quasi_identifiers
            .iter()
            .map(|q| table.require_column(q.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        let position = |name: &str| quasi_identifiers.iter().position(|q| q.as_ref() == name);
        // report an absent column before a mis-declared one
        table.require_column(suppressible)?;
        table.require_column(coarsenable)?;
        let coarsenable = position(coarsenable).ok_or_else(|| {
            SdcError::invalid_config(format!("'{coarsenable}' is not a quasi-identifier"))
        })?;
        let suppressible_pos = position(suppressible);
        if suppressible_pos.is_none() {
            log::debug!("'{suppressible}' is not part of the class key; suppression is inert");
        }
        Ok(Self {
            suppressible: suppressible_pos,
            coarsenable,
            qi_cols,
        })
    }

    pub fn suppressible_col(&self) -> Option<usize> {
        self.suppressible.map(|pos| self.qi_cols[pos])
    }

    pub fn coarsenable_col(&self) -> usize {
        self.qi_cols[self.coarsenable]
    }

    /// Rows sharing `key` on every quasi-identifier except the suppressible one.
    pub fn base_cluster(&self, table: &Table, key: &[Value]) -> Vec<usize> {
        (0..table.len())
            .filter(|&row| {
                self.qi_cols
                    .iter()
                    .enumerate()
                    .filter(|(pos, _)| Some(*pos) != self.suppressible)
                    .all(|(pos, &col)| *table.value(row, col) == key[pos])
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffendingClass {
    pub key: ClassKey,
    pub size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemedyKind {
    Suppression,
    Coarsening,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemedyEffect {
    pub records_changed: usize,
    pub clusters_changed: usize,
}

/// One step of the remediation chain, applied to a class smaller than `k`.
pub trait Remedy {
    fn kind(&self) -> RemedyKind;

    fn apply(&self, table: &mut Table, layout: &QiLayout, class: &OffendingClass) -> RemedyEffect;
}

/// Move the class into the missing bucket of its base cluster, then top the
/// bucket up to `k` with the first donors of the same base cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuppressToMissing {
    pub k: usize,
}

impl Remedy for SuppressToMissing {
    fn kind(&self) -> RemedyKind {
        RemedyKind::Suppression
    }

    fn apply(&self, table: &mut Table, layout: &QiLayout, class: &OffendingClass) -> RemedyEffect {
        let (Some(pos), Some(col)) = (layout.suppressible, layout.suppressible_col()) else {
            return RemedyEffect::default();
        };
        let cluster = layout.base_cluster(table, &class.key);
        let mut changed = 0usize;

        let value = &class.key[pos];
        if !value.is_missing() {
            for &row in &cluster {
                if table.value(row, col) == value && table.set_value(row, col, Value::Missing) {
                    changed += 1;
                }
            }
        }

        let in_bucket = cluster
            .iter()
            .filter(|&&row| table.value(row, col).is_missing())
            .count();
        let need = self.k.saturating_sub(in_bucket);
        if need > 0 {
            let donors: Vec<usize> = cluster
                .iter()
                .copied()
                .filter(|&row| !table.value(row, col).is_missing())
                .take(need)
                .collect();
            for row in donors {
                table.set_value(row, col, Value::Missing);
                changed += 1;
            }
        }

        RemedyEffect {
            records_changed: changed,
            clusters_changed: usize::from(changed > 0),
        }
    }
}

/// Replace the coarsenable attribute with a wildcard across the whole base
/// cluster. A cluster already at the wildcard is left alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoarsenToWildcard {
    pub wildcard: Value,
}

impl Remedy for CoarsenToWildcard {
    fn kind(&self) -> RemedyKind {
        RemedyKind::Coarsening
    }

    fn apply(&self, table: &mut Table, layout: &QiLayout, class: &OffendingClass) -> RemedyEffect {
        if class.key[layout.coarsenable] == self.wildcard {
            return RemedyEffect::default();
        }
        let col = layout.coarsenable_col();
        let mut changed = 0usize;
        for row in layout.base_cluster(table, &class.key) {
            if table.set_value(row, col, self.wildcard.clone()) {
                changed += 1;
            }
        }
        RemedyEffect {
            records_changed: changed,
            clusters_changed: usize::from(changed > 0),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnforcementReport {
    pub rounds: usize,
    /// No class violated `k` before the deletion fallback.
    pub converged: bool,
    pub suppressed_count: usize,
    pub coarsened_cluster_count: usize,
    pub coarsened_record_count: usize,
    pub dropped_class_count: usize,
    pub dropped_record_count: usize,
    pub dropped_record_ids: Vec<usize>,
}

impl EnforcementReport {
    fn record(&mut self, kind: RemedyKind, effect: RemedyEffect) {
        match kind {
            RemedyKind::Suppression => self.suppressed_count += effect.records_changed,
            RemedyKind::Coarsening => {
                self.coarsened_cluster_count += effect.clusters_changed;
                self.coarsened_record_count += effect.records_changed;
            }
        }
    }
}

pub struct KAnonymityEnforcer {
    quasi_identifiers: Vec<String>,
    suppressible: String,
    coarsenable: String,
    k: usize,
    max_rounds: usize,
    remedies: Vec<Box<dyn Remedy>>,
}

impl KAnonymityEnforcer {
    /// Enforcer with the default chain: suppression, then coarsening to `wildcard`.
    pub fn new<S: AsRef<str>>(
        quasi_identifiers: &[S],
        suppressible: &str,
        coarsenable: &str,
        wildcard: impl Into<Value>,
        k: usize,
        max_rounds: usize,
    ) -> Self {
        Self {
            quasi_identifiers: quasi_identifiers
                .iter()
                .map(|q| q.as_ref().to_string())
                .collect(),
            suppressible: suppressible.to_string(),
            coarsenable: coarsenable.to_string(),
            k,
            max_rounds,
            remedies: vec![
                Box::new(SuppressToMissing { k }),
                Box::new(CoarsenToWildcard {
                    wildcard: wildcard.into(),
                }),
            ],
        }
    }

    pub fn from_config(config: &SdcConfig) -> Self {
        Self::new(
            &config.quasi_identifiers,
            &config.suppressible_attribute,
            &config.coarsenable_attribute,
            config.coarsen_wildcard.clone(),
            config.k_threshold,
            config.max_rounds,
        )
    }

    /// Replace the remediation chain. Deletion stays the final fallback.
    pub fn with_remedies(mut self, remedies: Vec<Box<dyn Remedy>>) -> Self {
        self.remedies = remedies;
        self
    }

    pub fn remedy_kinds(&self) -> Vec<RemedyKind> {
        self.remedies.iter().map(|r| r.kind()).collect()
    }

    pub fn enforce(&self, table: &mut Table) -> Result<EnforcementReport, SdcError> {
        let layout = QiLayout::resolve(
            table,
            &self.quasi_identifiers,
            &self.suppressible,
            &self.coarsenable,
        )?;
        let mut report = EnforcementReport::default();

        for round in 1..=self.max_rounds {
            report.rounds = round;
            let mut progressed = false;
            let mut satisfied = false;

            for remedy in &self.remedies {
                let offending = self.offending(table, &layout);
                if offending.is_empty() {
                    satisfied = true;
                    break;
                }
                log::debug!(
                    "round {round}: {} class(es) below k={}, applying {:?}",
                    offending.len(),
                    self.k,
                    remedy.kind()
                );
                for class in &offending {
                    let effect = remedy.apply(table, &layout, class);
                    progressed |= effect.records_changed > 0;
                    report.record(remedy.kind(), effect);
                }
            }

            if satisfied {
                break;
            }
            if !progressed {
                log::debug!("round {round}: no remedy changed the table, stopping early");
                break;
            }
        }

        let failing = self.offending(table, &layout);
        report.converged = failing.is_empty();
        if !report.converged {
            let index = EquivalenceClassIndex::from_columns(table, &layout.qi_cols);
            let rows: BTreeSet<usize> = failing
                .iter()
                .filter_map(|c| index.get(&c.key))
                .flat_map(|c| c.members.iter().copied())
                .collect();
            report.dropped_class_count = failing.len();
            report.dropped_record_ids = table.remove_rows(&rows);
            report.dropped_record_count = report.dropped_record_ids.len();
            log::warn!(
                "k={} not reached after {} round(s); dropped {} record(s) in {} class(es)",
                self.k,
                report.rounds,
                report.dropped_record_count,
                report.dropped_class_count
            );
        }

        log::info!(
            "k-anonymity enforced: suppressed={}, coarsened clusters={}, dropped={}",
            report.suppressed_count,
            report.coarsened_cluster_count,
            report.dropped_record_count
        );
        Ok(report)
    }

    fn offending(&self, table: &Table, layout: &QiLayout) -> Vec<OffendingClass> {
        EquivalenceClassIndex::from_columns(table, &layout.qi_cols)
            .violating(self.k)
            .map(|c| OffendingClass {
                key: c.key.clone(),
                size: c.size(),
            })
            .collect()
    }
}
