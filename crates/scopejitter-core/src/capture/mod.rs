//! Capture handling
//!
//! - Raw capture records and the instrument boundary ([`source`])
//! - Window reconstruction from sequence buffers ([`window`])

pub mod source;
pub mod window;
