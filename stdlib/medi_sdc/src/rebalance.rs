use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{EquivalenceClassIndex, RebalanceConfig, SdcConfig, SdcError, Table, Value};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebalanceReport {
    pub eligible_groups: usize,
    pub groups_processed: usize,
    /// Groups where the minority cap cut the drawn flip fraction.
    pub groups_capped: usize,
    pub total_flipped: usize,
}

/// Dilutes classes dominated by one sensitive value by flipping a random
/// fraction of the dominant records, never pushing the minority share above
/// the configured cap.
pub struct DominanceRebalancer {
    quasi_identifiers: Vec<String>,
    sensitive: String,
    domain: [Value; 2],
    dominance_threshold: f64,
    settings: RebalanceConfig,
}

impl DominanceRebalancer {
    /// Fails when the flip range is empty or the minority cap is outside `[0, 1)`.
    pub fn new<S: AsRef<str>>(
        quasi_identifiers: &[S],
        sensitive: &str,
        domain: [Value; 2],
        dominance_threshold: f64,
        settings: RebalanceConfig,
    ) -> Result<Self, SdcError> {
        settings.validate()?;
        Ok(Self {
            quasi_identifiers: quasi_identifiers
                .iter()
                .map(|q| q.as_ref().to_string())
                .collect(),
            sensitive: sensitive.to_string(),
            domain,
            dominance_threshold,
            settings,
        })
    }

    pub fn from_config(config: &SdcConfig, settings: RebalanceConfig) -> Result<Self, SdcError> {
        Self::new(
            &config.quasi_identifiers,
            &config.sensitive_attribute,
            config.sensitive_domain.clone(),
            config.dominance_threshold,
            settings,
        )
    }

    pub fn rebalance(
        &self,
        table: &mut Table,
        rng: &mut impl Rng,
    ) -> Result<RebalanceReport, SdcError> {
        let qi_cols = self
            .quasi_identifiers
            .iter()
            .map(|q| table.require_column(q))
            .collect::<Result<Vec<_>, _>>()?;
        let col = table.require_column(&self.sensitive)?;
        let cap = self.settings.minority_cap;
        let mut report = RebalanceReport::default();

        // flips never touch quasi-identifiers, so one snapshot serves every class
        let index = EquivalenceClassIndex::from_columns(table, &qi_cols);
        for class in index.classes() {
            let k = class.size();
            let rows_with = |target: &Value| -> Vec<usize> {
                class
                    .members
                    .iter()
                    .copied()
                    .filter(|&row| table.value(row, col) == target)
                    .collect()
            };
            let first = rows_with(&self.domain[0]);
            let second = rows_with(&self.domain[1]);
            let (dominant_rows, opposite, n_minority) = if first.len() >= second.len() {
                (first, &self.domain[1], second.len())
            } else {
                (second, &self.domain[0], first.len())
            };
            let n_dom = dominant_rows.len();
            if k == 0 || n_dom == 0 || (n_dom as f64 / k as f64) < self.dominance_threshold {
                continue;
            }
            report.eligible_groups += 1;

            let minority_share = n_minority as f64 / k as f64;
            if minority_share >= cap {
                continue;
            }
            let desired: f64 = rng.gen_range(self.settings.flip_frac_low..self.settings.flip_frac_high);
            let allowed = (cap - minority_share).max(0.0);
            let actual = desired.min(allowed);

            let x_draw = (k as f64 * actual).floor() as usize;
            let x_cap = ((k as f64 * allowed).floor() as usize).min(n_dom);
            let n_flip = if x_draw == 0 && x_cap >= 1 {
                1
            } else {
                x_draw.min(x_cap)
            };
            if n_flip == 0 {
                continue;
            }

            let chosen: Vec<usize> = dominant_rows
                .choose_multiple(rng, n_flip)
                .copied()
                .collect();
            log::debug!("rebalancing class {:?}: flipping {n_flip} of {k}", class.key);
            for row in chosen {
                table.set_value(row, col, opposite.clone());
            }
            report.total_flipped += n_flip;
            report.groups_processed += 1;
            if actual < desired {
                report.groups_capped += 1;
            }
        }

        log::info!(
            "dominance rebalancing on '{}': {} eligible, {} processed, {} flipped",
            self.sensitive,
            report.eligible_groups,
            report.groups_processed,
            report.total_flipped
        );
        Ok(report)
    }
}
