//! Error types for the compilation pipeline.
//!
//! Untranslatable expressions are not errors: the binder reports them as
//! `None` and the compiler keeps them client-side. These types cover the
//! fatal cases only.

use crate::expr::SourceId;
use thiserror::Error;

/// Fatal failure while generating command text.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RenderError {
    /// A node kind the generator has no rendering for reached it
    #[error("cannot render {kind} expression")]
    UnsupportedExpression { kind: &'static str },

    #[error("storage expression for '{property}' references a node without an alias")]
    UnaliasedNode { property: String },

    #[error("return star is set but no node can be returned")]
    NoReturnStarNode,

    /// Nested reads are only valid as sources that were lifted earlier
    #[error("nested read clause cannot be rendered")]
    NestedRead,

    #[error("invalid identifier '{name}': {reason}")]
    InvalidIdentifier { name: String, reason: String },

    /// No literal mapping exists for a constant
    #[error("no literal mapping for value of type {value_type}")]
    NoLiteralMapping { value_type: String },

    /// A parameter was referenced but the caller supplied no value
    #[error("missing value for parameter '{name}'")]
    MissingParameter { name: String },
}

/// Failure reported by an IR transform pass.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransformError {
    #[error("duplicate return alias '{alias}'")]
    DuplicateAlias { alias: String },

    #[error("reading clause {index} has an empty pattern")]
    EmptyPattern { index: usize },

    #[error("storage expression for '{property}' is bound to a node without an alias")]
    UnaliasedStorage { property: String },
}

/// Failure while compiling a query model.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CompileError {
    #[error("unknown entity '{name}'")]
    UnknownEntity { name: String },

    #[error("{source_id} is not registered with any read")]
    UnknownSource { source_id: SourceId },

    #[error("unsupported query shape: {0}")]
    Unsupported(String),

    /// Configuration rejected by `CompilerConfig::validate`
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

pub type CompileResult<T> = Result<T, CompileError>;
