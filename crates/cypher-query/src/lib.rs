//! # Cypher Query Compiler
//!
//! Compiles object-query models (sources, filters, joins, projections)
//! into Cypher text plus a parameter table.
//!
//! ## Pipeline
//!
//! ```text
//! QueryModel -> SourceRegistry -> Binder -> ReadOnlyExpression -> CypherGenerator
//! ```
//!
//! - **Registry** maps every data source to its read and `MATCH` clause
//! - **Binder** rewrites predicates and projections into IR expressions,
//!   returning `None` for anything that must run client-side
//! - **Transforms** validate the finished read
//! - **Generator** renders text with precedence, pattern syntax and literals
//!
//! ## Example
//!
//! ```rust
//! use cypher_query::{Expr, Model, Property, QueryCompiler, QueryModel, QuerySource, ValueType};
//!
//! let schema = Model::builder()
//!     .entity("Warehouse")
//!     .property(Property::new("Location", ValueType::String))
//!     .done()
//!     .build();
//!
//! let warehouses = QuerySource::entity(0, "w", "Warehouse");
//! let model = QueryModel::from_source(warehouses.clone())
//!     .select(warehouses.member("Location", ValueType::String));
//!
//! let compiled = QueryCompiler::new(schema).compile(&model).unwrap();
//! assert_eq!(compiled.text, r#"MATCH (w:Warehouse) RETURN "w"."Location""#);
//! ```

pub mod binder;
pub mod compiler;
pub mod error;
pub mod expr;
pub mod ir;
pub mod metadata;
pub mod model;
pub mod registry;
pub mod render;
pub mod storage;
pub mod transform;
pub mod types;

pub use binder::{Binder, NoOuterQuery, OuterQueryBinder};
pub use compiler::{ClientFragment, CompiledQuery, FragmentKind, QueryCompiler};
pub use error::{CompileError, CompileResult, RenderError, TransformError};
pub use expr::{BinaryOp, Expr, MemberKey, MemberRef, SourceId};
pub use ir::ReadOnlyExpression;
pub use metadata::{Entity, Model, Property, PropertyRef};
pub use model::{BodyClause, JoinClause, QueryModel, QuerySource, RelationshipSpec};
pub use registry::SourceRegistry;
pub use render::{CypherGenerator, QueryRenderer, RenderedQuery};
pub use storage::{DefaultGenerationHelper, DefaultTypeMapper, GenerationHelper, TypeMapper};
pub use transform::{QueryTransform, ValidateTransform};
pub use types::{Value, ValueType};

pub use cypher_config::CompilerConfig;
