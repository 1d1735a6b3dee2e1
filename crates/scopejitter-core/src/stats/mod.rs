//! Offset statistics
//!
//! - Running offset collection per sweep value ([`collection`])
//! - Outlier cutoff, histogram and Gaussian width ([`distribution`])

pub mod collection;
pub mod distribution;
