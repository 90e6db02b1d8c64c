//! incopt — incremental whole-program optimizer core.
//!
//! Maintains a class/interface/method dependency graph across successive
//! compiler runs and drives re-optimization of only the methods whose inputs
//! actually changed, rather than the whole program.
//!
//! The driver, [`IncOptimizer`], is the crate's single entry point: feed it
//! a reachability analysis and a [`external::TreeSupplier`]/
//! [`external::BodyOptimizer`]/[`external::Emitter`] triple, and call
//! [`IncOptimizer::update`] once per compiler run.
//!
//! ```rust
//! use incopt::{IncOptimizer, external::InlineabilityPolicy};
//!
//! let optimizer = IncOptimizer::new(InlineabilityPolicy::default());
//! assert!(optimizer.is_batch_mode());
//! ```

pub mod class;
pub mod container;
pub mod driver;
pub mod error;
pub mod external;
pub mod ids;
pub mod interface_type;
pub mod method_impl;
pub mod trait_impl;

pub use driver::{IncOptimizer, UpdateSummary};
pub use error::{OptimizerError, Result};
pub use ids::{ContainerId, MethodKey};
