//! Error types for the incremental optimizer core.

use thiserror::Error;

/// Result type for driver operations.
pub type Result<T> = std::result::Result<T, OptimizerError>;

#[derive(Error, Debug)]
pub enum OptimizerError {
    /// The analyzer reported a class whose declared superclass is absent
    /// from both the stored graph and the set of needed classes. Fatal to
    /// this run; the caller should fall back to batch mode.
    #[error("class {class} declares superclass {superclass}, which is not present in this run")]
    MissingSuperclass { class: String, superclass: String },

    /// The tree supplier reported a failure that is not the tolerated
    /// "no version yet, no tree" refusal case.
    #[error("tree supplier failed for {0}: {1}")]
    TreeSupplierError(String, String),

    /// A structural invariant was violated in a way that could not be
    /// caught by an assertion close to the violation (e.g. surfaced from a
    /// batch of deferred work). The optimizer state is corrupt and must not
    /// be reused; the caller should drop it and rebuild in batch mode.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}
