use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{check_probability, PramModel, SdcError, Value};

/// Options of one disclosure-control run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SdcConfig {
    /// Published quasi-identifiers, in key order.
    pub quasi_identifiers: Vec<String>,
    pub suppressible_attribute: String,
    pub coarsenable_attribute: String,
    #[serde(default = "default_wildcard")]
    pub coarsen_wildcard: Value,
    pub k_threshold: usize,
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
    /// Column -> flip probability.
    #[serde(default)]
    pub pram_probabilities: BTreeMap<String, f64>,
    /// Column -> transition model and domain, for every PRAM column.
    #[serde(default)]
    pub pram_domains: BTreeMap<String, PramModel>,
    pub sensitive_attribute: String,
    pub sensitive_domain: [Value; 2],
    /// Share at which a class counts as dominated by one sensitive value.
    #[serde(default = "default_dominance_threshold")]
    pub dominance_threshold: f64,
    #[serde(default = "default_budget")]
    pub max_swaps: usize,
    #[serde(default = "default_budget")]
    pub max_flips: usize,
    /// Suppress the suppressible attribute in classes below k before PRAM.
    #[serde(default)]
    pub initial_suppression: bool,
    #[serde(default)]
    pub rebalance: Option<RebalanceConfig>,
    #[serde(default = "default_seed")]
    pub random_seed: u64,
}

/// Settings of the optional dominance rebalancing step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebalanceConfig {
    #[serde(default = "default_flip_frac_low")]
    pub flip_frac_low: f64,
    #[serde(default = "default_flip_frac_high")]
    pub flip_frac_high: f64,
    /// Upper bound on the minority share after flipping.
    #[serde(default = "default_minority_cap")]
    pub minority_cap: f64,
}

impl Default for RebalanceConfig {
    fn default() -> Self {
        Self {
            flip_frac_low: default_flip_frac_low(),
            flip_frac_high: default_flip_frac_high(),
            minority_cap: default_minority_cap(),
        }
    }
}

fn default_wildcard() -> Value {
    Value::text("Any")
}

fn default_max_rounds() -> usize {
    4
}

fn default_dominance_threshold() -> f64 {
    0.8
}

fn default_budget() -> usize {
    1000
}

fn default_seed() -> u64 {
    69
}

fn default_flip_frac_low() -> f64 {
    0.2
}

fn default_flip_frac_high() -> f64 {
    0.4
}

fn default_minority_cap() -> f64 {
    0.4
}

impl SdcConfig {
    /// Survey release: sex, age band, marital status and voting channel
    /// published at k = 3, party as the sensitive attribute.
    pub fn survey_defaults() -> Self {
        let pram_probabilities = BTreeMap::from([
            ("age_group".to_string(), 0.02),
            ("education".to_string(), 0.03),
            ("evote".to_string(), 0.03),
            ("marital_status".to_string(), 0.01),
            ("sex".to_string(), 0.01),
        ]);
        let pram_domains = BTreeMap::from([
            (
                "age_group".to_string(),
                PramModel::adjacent_bands("18-30", "31-50", "51+"),
            ),
            (
                "education".to_string(),
                PramModel::binary("Lower education", "Higher education"),
            ),
            (
                "evote".to_string(),
                PramModel::binary(Value::Code(0), Value::Code(1)),
            ),
            (
                "marital_status".to_string(),
                PramModel::binary("Married", "Not married"),
            ),
            ("sex".to_string(), PramModel::binary("Female", "Male")),
        ]);
        Self {
            quasi_identifiers: ["sex", "age_group", "marital_status", "evote"]
                .into_iter()
                .map(String::from)
                .collect(),
            suppressible_attribute: "evote".into(),
            coarsenable_attribute: "marital_status".into(),
            coarsen_wildcard: default_wildcard(),
            k_threshold: 3,
            max_rounds: default_max_rounds(),
            pram_probabilities,
            pram_domains,
            sensitive_attribute: "party".into(),
            sensitive_domain: [Value::text("Red"), Value::text("Green")],
            dominance_threshold: default_dominance_threshold(),
            max_swaps: default_budget(),
            max_flips: default_budget(),
            initial_suppression: false,
            rebalance: None,
            random_seed: default_seed(),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, SdcError> {
        let config: SdcConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, SdcError> {
        let data = fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    /// Every column the run reads or writes.
    pub fn required_columns(&self) -> Vec<&str> {
        let mut cols: Vec<&str> = self.quasi_identifiers.iter().map(String::as_str).collect();
        cols.push(&self.sensitive_attribute);
        for c in self.pram_probabilities.keys() {
            if !cols.contains(&c.as_str()) {
                cols.push(c);
            }
        }
        cols
    }

    /// Structural checks that need no table.
    pub fn validate(&self) -> Result<(), SdcError> {
        if self.quasi_identifiers.is_empty() {
            return Err(SdcError::invalid_config("quasi_identifiers must not be empty"));
        }
        if self.k_threshold == 0 {
            return Err(SdcError::invalid_config("k_threshold must be positive"));
        }
        if self.max_rounds == 0 {
            return Err(SdcError::invalid_config("max_rounds must be positive"));
        }
        for attr in [&self.suppressible_attribute, &self.coarsenable_attribute] {
            if !self.quasi_identifiers.contains(attr) {
                return Err(SdcError::invalid_config(format!(
                    "'{attr}' must be one of the quasi_identifiers"
                )));
            }
        }
        if self.suppressible_attribute == self.coarsenable_attribute {
            return Err(SdcError::invalid_config(
                "suppressible and coarsenable attributes must differ",
            ));
        }
        if self.quasi_identifiers.contains(&self.sensitive_attribute) {
            return Err(SdcError::invalid_config(format!(
                "sensitive attribute '{}' cannot be a quasi-identifier",
                self.sensitive_attribute
            )));
        }
        let [a, b] = &self.sensitive_domain;
        if a == b || a.is_missing() || b.is_missing() {
            return Err(SdcError::invalid_config(
                "sensitive_domain needs two distinct, non-missing labels",
            ));
        }
        for (column, &p) in &self.pram_probabilities {
            check_probability(p)?;
            if !self.pram_domains.contains_key(column) {
                return Err(SdcError::invalid_config(format!(
                    "PRAM column '{column}' has no declared domain"
                )));
            }
        }
        if !(self.dominance_threshold > 0.0 && self.dominance_threshold < 1.0) {
            return Err(SdcError::invalid_config(
                "dominance_threshold must lie in (0, 1)",
            ));
        }
        if let Some(r) = &self.rebalance {
            r.validate()?;
        }
        Ok(())
    }
}

impl RebalanceConfig {
    pub fn validate(&self) -> Result<(), SdcError> {
        let fractions_ok = 0.0 <= self.flip_frac_low
            && self.flip_frac_low < self.flip_frac_high
            && self.flip_frac_high <= 1.0;
        if !fractions_ok || !(0.0..1.0).contains(&self.minority_cap) {
            return Err(SdcError::invalid_config(
                "rebalance needs 0 <= flip_frac_low < flip_frac_high <= 1 and minority_cap in [0, 1)",
            ));
        }
        Ok(())
    }
}
