//! URL policy shared by the navguard server and agent.

pub mod pattern;
pub mod policy;
pub mod suggest;
pub mod wire;

pub use pattern::{compile, MatchTarget, Matcher, PatternError};
pub use policy::{in_scope, Decision, PatternKind, PatternSet, Policy, UnknownPatternKind};
pub use suggest::suggest_pattern;
pub use wire::{PatternRecord, PatternSnapshot, PushMessage};
