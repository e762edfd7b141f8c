//! # Collection of Basic Data Structures
//!
//! - `storage`: Arena-based storage for the linked basic-block graph.
//! - `bimap`: A bidirectional map, used for the operator table.

pub mod bimap;
pub mod storage;
