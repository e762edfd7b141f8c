#![forbid(unsafe_code)]
#![warn(clippy::wildcard_enum_match_arm)]

/// Raise an internal compiler error: an invariant of IR construction or of
/// the IR itself does not hold. These are bugs of the compiler, never of
/// the user's program.
#[macro_export]
macro_rules! ice {
    ($($arg:tt)*) => {
        panic!("internal compiler error: {}", format_args!($($arg)*))
    };
}

pub mod collections;
pub mod ir;
pub mod irgen;
pub mod typed;
pub mod utils;
