//! Execution engine for the Warden state engine
//!
//! The [`Engine`] ties the layers together: it keeps the unit-of-work
//! registry, resolves each unit's manifest into guarded views, runs the
//! policy validator around the unit, and commits through the conflict
//! resolver with retries.
//!
//! ```ignore
//! let engine = Engine::new(EngineConfig::default())?;
//! engine.register("bump", Manifest::builder().write("domain.counter").build()?);
//! let out = engine.execute("bump", &Value::Null, &ExecuteOptions::new(), |ctx| {
//!     ctx.view_at("domain")?.set("counter", 1)
//! })?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod context;
pub mod engine;
mod metrics;
pub mod registry;

pub use config::EngineConfig;
pub use context::{ExecuteOptions, LocalScope, UnitContext};
pub use engine::Engine;
pub use metrics::EngineMetrics;
pub use registry::ManifestRegistry;
