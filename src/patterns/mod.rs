//! Pattern Library: declarative per-field extraction rules.

pub mod library;
pub mod normalize;

pub use library::{patterns_for, FieldPattern};
