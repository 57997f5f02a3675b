//! Multilevel, multi-constraint hypergraph partitioning.
//!
//! [`tritonpart::partition`] and [`tritonpart::partition_hypergraph`] are the entry points; the
//! modules below are the stages they chain together.

#![allow(clippy::needless_range_loop, clippy::too_many_arguments)]

pub mod coarsen;
pub mod error;
pub mod evaluator;
pub mod graphio;
pub mod hypergraph;
pub mod ilp;
pub mod initpart;
pub mod multilevel;
pub mod options;
pub mod refine;
pub mod tritonpart;

pub(crate) mod defs;
pub(crate) mod greedy;
pub(crate) mod ilprefine;
pub(crate) mod kwayfm;
pub mod kwaypm;
pub mod pqueue;

pub mod util;

pub use error::{Error, Result};
pub use hypergraph::Hypergraph;
pub use options::Options;

#[cfg(test)]
mod tests;
