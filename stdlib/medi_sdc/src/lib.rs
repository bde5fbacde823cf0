//! Statistical disclosure control for Medi survey microdata.
//!
//! Turns a record-level table into a release in which every combination of
//! the published quasi-identifiers occurs at least `k` times and, where
//! possible, every such group shows both values of a binary sensitive
//! attribute.
//!
//! Pipeline: PRAM -> k-anonymity enforcement (suppression, coarsening,
//! deletion) -> l-diversity repair (swaps, then bounded flips), with risk
//! metrics computed before and after. All randomness comes from one seeded
//! generator per run.
mod config;
mod enforce;
mod error;
mod index;
mod metrics;
mod pipeline;
mod pram;
mod rebalance;
mod repair;
mod table;

pub use config::*;
pub use enforce::*;
pub use error::*;
pub use index::*;
pub use metrics::*;
pub use pipeline::*;
pub use pram::*;
pub use rebalance::*;
pub use repair::*;
pub use table::*;
