//! Passes over a finished read, run before rendering.

mod validate;

pub use validate::ValidateTransform;

use crate::error::TransformError;
use crate::ir::ReadOnlyExpression;

/// A pass that checks or rewrites a read.
pub trait QueryTransform: Send + Sync {
    fn name(&self) -> &'static str;

    fn transform(&self, ir: ReadOnlyExpression) -> Result<ReadOnlyExpression, TransformError>;
}
