//! Post-randomization (PRAM) of categorical columns.
//!
//! Every non-missing value consumes exactly one uniform draw from the
//! generator, whether or not it ends up perturbed, so a column's output is a
//! pure function of its input and the generator state.

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{DataQualityWarning, SdcError, Table, Value};

/// Transition model together with its declared domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PramModel {
    /// Flip to the other category with probability `p`.
    Binary([Value; 2]),
    /// Ordered low/mid/high bands; moves only to an adjacent band.
    /// `L -> M` and `H -> M` with probability `p`, `M -> L` and `M -> H`
    /// with `p / 2` each.
    AdjacentBands([Value; 3]),
}

impl PramModel {
    pub fn binary(a: impl Into<Value>, b: impl Into<Value>) -> Self {
        PramModel::Binary([a.into(), b.into()])
    }

    pub fn adjacent_bands(
        low: impl Into<Value>,
        mid: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        PramModel::AdjacentBands([low.into(), mid.into(), high.into()])
    }

    pub fn domain(&self) -> &[Value] {
        match self {
            PramModel::Binary(d) => d.as_slice(),
            PramModel::AdjacentBands(d) => d.as_slice(),
        }
    }

    /// Map one value given its uniform draw `u` in `[0, 1)`.
    /// Returns `None` when the value is outside the domain.
    pub fn transition(&self, value: &Value, u: f64, p: f64) -> Option<Value> {
        match self {
            PramModel::Binary([a, b]) => {
                let other = if value == a {
                    b
                } else if value == b {
                    a
                } else {
                    return None;
                };
                Some(if u < p { other.clone() } else { value.clone() })
            }
            PramModel::AdjacentBands([low, mid, high]) => {
                let next = if value == low {
                    if u < p {
                        mid
                    } else {
                        low
                    }
                } else if value == mid {
                    if u < p / 2.0 {
                        low
                    } else if u < p {
                        high
                    } else {
                        mid
                    }
                } else if value == high {
                    if u < p {
                        mid
                    } else {
                        high
                    }
                } else {
                    return None;
                };
                Some(next.clone())
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PramOutcome {
    pub perturbed: usize,
    pub out_of_domain: usize,
    /// Out-of-domain values with their occurrence counts.
    pub unknown_values: BTreeMap<Value, usize>,
}

impl PramOutcome {
    pub fn warnings(&self, column: &str) -> Vec<DataQualityWarning> {
        self.unknown_values
            .iter()
            .map(|(value, &count)| DataQualityWarning {
                column: column.to_string(),
                value: value.clone(),
                count,
            })
            .collect()
    }
}

pub fn check_probability(p: f64) -> Result<(), SdcError> {
    if !(0.0..=1.0).contains(&p) {
        return Err(SdcError::invalid_config(format!(
            "PRAM probability {p} is outside [0, 1]"
        )));
    }
    Ok(())
}

/// Perturb a column of values, returning the new column.
pub fn pram_values(
    values: &[Value],
    model: &PramModel,
    p: f64,
    rng: &mut impl Rng,
) -> Result<(Vec<Value>, PramOutcome), SdcError> {
    check_probability(p)?;
    let mut outcome = PramOutcome::default();
    let out = values
        .iter()
        .map(|v| {
            if v.is_missing() {
                return v.clone();
            }
            let u: f64 = rng.gen();
            match model.transition(v, u, p) {
                Some(next) => {
                    if next != *v {
                        outcome.perturbed += 1;
                    }
                    next
                }
                None => {
                    outcome.out_of_domain += 1;
                    *outcome.unknown_values.entry(v.clone()).or_insert(0) += 1;
                    v.clone()
                }
            }
        })
        .collect();
    Ok((out, outcome))
}

/// Apply PRAM to the named column of `table` in place.
pub fn apply_pram(
    table: &mut Table,
    column: &str,
    model: &PramModel,
    p: f64,
    rng: &mut impl Rng,
) -> Result<PramOutcome, SdcError> {
    let col = table.require_column(column)?;
    let current: Vec<Value> = table.column(col).cloned().collect();
    let (next, outcome) = pram_values(&current, model, p, rng)?;
    for (row, value) in next.into_iter().enumerate() {
        table.set_value(row, col, value);
    }
    if outcome.out_of_domain > 0 {
        log::warn!(
            "PRAM on '{column}': {} value(s) outside the declared domain passed through",
            outcome.out_of_domain
        );
    }
    log::debug!("PRAM on '{column}' (p = {p}): {} perturbed", outcome.perturbed);
    Ok(outcome)
}
