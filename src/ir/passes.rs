pub mod escape;

use self::escape::EscapeAnalysis;
use super::passman::PassManager;

/// Register every optimization pass and its parameters.
pub fn register_all(passman: &mut PassManager) { EscapeAnalysis::register(passman); }
