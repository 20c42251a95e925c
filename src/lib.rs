//! vacuum - OpenAPI and AsyncAPI linter
//!
//! A fast, rule-driven linter for API documents. Rule sets are
//! Spectral-compatible; custom functions can be written in JavaScript.
//!
//! # Architecture
//!
//! ```text
//! bytes -> spec_info -> index -> resolver -> motor -> RuleResultSet
//!                                     ^
//!                        rulesets + functions (+ scripting)
//! ```
//!
//! The engine ([`motor`]) sniffs the document, builds the [`index`],
//! resolves references, then fans every rule's `given` matches out to the
//! rule functions on a worker pool and collects a deterministic result set.
//!
//! # Rule sets
//!
//! ```yaml
//! extends: [[vacuum:oas, recommended]]
//! rules:
//!   operation-tags: error
//!   title-check:
//!     given: $.info
//!     then:
//!       field: title
//!       function: truthy
//! ```

pub mod changes;
pub mod config;
pub mod doctor;
pub mod functions;
pub mod index;
pub mod jsonpath;
pub mod model;
pub mod motor;
pub mod node;
pub mod output;
pub mod resolver;
pub mod rulesets;
pub mod scripting;
pub mod spec_info;

// Re-export main types
pub use config::Config;
pub use functions::FunctionRegistry;
pub use model::{Rule, RuleFunction, RuleFunctionResult, RuleResultSet, Severity};
pub use motor::{apply_rules_to_rule_set, RuleSetExecution, RuleSetExecutionResult, RuleTiming};
pub use rulesets::{RuleSet, RuleSets};
pub use spec_info::{extract_spec_info, SpecInfo};
