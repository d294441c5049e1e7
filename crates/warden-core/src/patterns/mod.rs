//! Pattern registry and safe evaluator.
//!
//! Weighted detection rules with tamper-evident hashes, a ReDoS-resistant
//! matcher seam, bounded evaluation with structured telemetry, and signed
//! hot updates.

mod evaluator;
mod matcher;
mod registry;
mod telemetry;
mod types;

pub use evaluator::PatternEngine;
pub use matcher::CompiledMatcher;
pub use registry::{PatternRegistry, SignedPatternBatch};
pub use telemetry::{PatternEvent, PatternObserver, TracingObserver};
pub use types::{
    DetectionOutcome, PatternAction, PatternExpr, PatternPriority, SecurityPattern,
    ThreatCategory, TriggeredPattern,
};
