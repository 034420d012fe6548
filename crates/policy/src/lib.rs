//! Policy validation for the Warden state engine
//!
//! - [`RuleSet`]: declarative rules keyed by unit of work, loadable from
//!   TOML or JSON
//! - [`PolicyValidator`]: evaluates inputs and pending outputs and escalates
//!   per [`Severity`]

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod rule;
pub mod validator;

pub use rule::{Checks, Rule, RulePhase, RuleSet, Severity};
pub use validator::PolicyValidator;
