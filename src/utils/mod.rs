//! # General Utilities
//!
//! Graph algorithms shared by the verifier, the optimizer and the reference
//! interpreter.

pub mod cfg;

pub use cfg::{CfgInfo, CfgNode, CfgRegion};
