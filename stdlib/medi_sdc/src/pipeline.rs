//! End-to-end release pipeline.
//!
//! ```ignore
//! use medi_sdc::{Anonymizer, SdcConfig};
//! let anonymizer = Anonymizer::new(SdcConfig::survey_defaults())?;
//! let report = anonymizer.run(&mut table)?;
//! assert!(report.after.k_min >= 3 || report.after.total_records == 0);
//! ```

use std::collections::{BTreeMap, BTreeSet};

use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{
    apply_pram, risk_metrics, DataQualityWarning, DiversityRepairer, DominanceRebalancer,
    EquivalenceClassIndex, KAnonymityEnforcer, PramOutcome, RebalanceReport, RiskMetrics,
    SdcConfig, SdcError, Table, Value,
};

/// Everything a run changed, plus risk before and after.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub initially_suppressed: usize,
    pub pram: BTreeMap<String, PramOutcome>,
    pub rounds: usize,
    pub converged: bool,
    pub suppressed_count: usize,
    pub coarsened_cluster_count: usize,
    pub dropped_record_count: usize,
    pub dropped_record_ids: Vec<usize>,
    pub swap_count: usize,
    pub flip_count: usize,
    pub rebalance: Option<RebalanceReport>,
    pub warnings: Vec<DataQualityWarning>,
    pub before: RiskMetrics,
    pub after: RiskMetrics,
}

pub struct Anonymizer {
    config: SdcConfig,
}

impl Anonymizer {
    pub fn new(config: SdcConfig) -> Result<Self, SdcError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SdcConfig {
        &self.config
    }

    /// Anonymize `table` in place. Fails only on a missing column, and then
    /// before anything is modified.
    pub fn run(&self, table: &mut Table) -> Result<RunReport, SdcError> {
        let cfg = &self.config;
        for column in cfg.required_columns() {
            table.require_column(column)?;
        }
        let mut rng = StdRng::seed_from_u64(cfg.random_seed);

        let before = self.metrics(table)?;
        log::info!(
            "release run on {} record(s): k_min={}, avg risk={:.4}",
            before.total_records,
            before.k_min,
            before.avg_individual_risk
        );

        let initially_suppressed = if cfg.initial_suppression {
            suppress_small_classes(
                table,
                &cfg.quasi_identifiers,
                &cfg.suppressible_attribute,
                cfg.k_threshold,
            )?
        } else {
            0
        };

        let mut pram = BTreeMap::new();
        let mut warnings = Vec::new();
        for (column, &p) in &cfg.pram_probabilities {
            let model = cfg.pram_domains.get(column).ok_or_else(|| {
                SdcError::invalid_config(format!("PRAM column '{column}' has no declared domain"))
            })?;
            let outcome = apply_pram(table, column, model, p, &mut rng)?;
            warnings.extend(outcome.warnings(column));
            pram.insert(column.clone(), outcome);
        }

        let enforcement = KAnonymityEnforcer::from_config(cfg).enforce(table)?;
        let repair = DiversityRepairer::from_config(cfg).repair(table, &mut rng)?;
        let rebalance = match &cfg.rebalance {
            Some(settings) => Some(
                DominanceRebalancer::from_config(cfg, settings.clone())?
                    .rebalance(table, &mut rng)?,
            ),
            None => None,
        };

        let after = self.metrics(table)?;
        log::info!(
            "release ready: {} record(s), k_min={}, avg risk={:.4}, l violations={}",
            after.total_records,
            after.k_min,
            after.avg_individual_risk,
            after.l_violations
        );

        Ok(RunReport {
            initially_suppressed,
            pram,
            rounds: enforcement.rounds,
            converged: enforcement.converged,
            suppressed_count: enforcement.suppressed_count,
            coarsened_cluster_count: enforcement.coarsened_cluster_count,
            dropped_record_count: enforcement.dropped_record_count,
            dropped_record_ids: enforcement.dropped_record_ids,
            swap_count: repair.swap_count,
            flip_count: repair.flip_count,
            rebalance,
            warnings,
            before,
            after,
        })
    }

    fn metrics(&self, table: &Table) -> Result<RiskMetrics, SdcError> {
        let cfg = &self.config;
        let index = EquivalenceClassIndex::build(table, &cfg.quasi_identifiers)?;
        Ok(risk_metrics(
            table,
            &index,
            cfg.k_threshold,
            Some(cfg.sensitive_attribute.as_str()),
        ))
    }
}

/// Blank the suppressible attribute of every record whose class is below `k`.
/// Returns how many values actually changed.
pub fn suppress_small_classes<S: AsRef<str>>(
    table: &mut Table,
    quasi_identifiers: &[S],
    suppressible: &str,
    k: usize,
) -> Result<usize, SdcError> {
    let index = EquivalenceClassIndex::build(table, quasi_identifiers)?;
    let col = table.require_column(suppressible)?;
    let rows: BTreeSet<usize> = index
        .violating(k)
        .flat_map(|c| c.members.iter().copied())
        .collect();
    let changed = rows
        .into_iter()
        .filter(|&row| table.set_value(row, col, Value::Missing))
        .count();
    log::info!("initial suppression of '{suppressible}': {changed} record(s) below k={k}");
    Ok(changed)
}
