//! Isolated execution of generated JavaScript tests against user code.
//!
//! `Sandbox::execute_tests` is the entry point: it bundles the user code,
//! the generated tests and the harness into one script, runs it in a fresh
//! QuickJS isolate with memory and time limits, and returns the checked
//! `ExecutionResult`.

pub mod bindings;
pub mod bundler;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod module_syntax;

#[cfg(test)]
mod executor_tests;

pub use bundler::Bundle;
pub use engine::{EngineLimits, EngineState, IsolateTracker, IsolatedEngine};
pub use error::{ErrorKind, SandboxError, SourceOrigin};
pub use evaluator::{parse_report, summarize};
pub use executor::Sandbox;
