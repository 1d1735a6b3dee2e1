//! Signal processing
//!
//! - Threshold-crossing edge detection ([`edge`])
//! - Reference/chip edge reconciliation into offsets ([`reconcile`])
//! - Synthetic sequence captures for tests and demos ([`synth`])

pub mod edge;
pub mod reconcile;
pub mod synth;
