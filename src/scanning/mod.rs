//! Tree scanning: the merged ignore-rules engine and the file walker
//! built on top of it.

mod rules;
mod walker;

pub use rules::IgnoreRules;
pub use walker::FileWalker;
