//! Renderers turning a finished read into query text.

mod builder;
mod cypher;

pub use builder::CommandBuilder;
pub use cypher::CypherGenerator;

use crate::error::RenderError;
use crate::ir::ReadOnlyExpression;
use serde_json::Value;
use std::collections::HashMap;

/// Output from rendering
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedQuery {
    /// The generated query text
    pub text: String,
    /// Parameters to bind to the query
    pub params: HashMap<String, Value>,
}

/// Trait for rendering a read to a target query language.
pub trait QueryRenderer: Send + Sync {
    /// Unique name for this renderer
    fn name(&self) -> &str;

    /// Render the read to query text with parameters
    fn render(&self, ir: &ReadOnlyExpression) -> Result<RenderedQuery, RenderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockRenderer;

    impl QueryRenderer for MockRenderer {
        fn name(&self) -> &str {
            "mock"
        }

        fn render(&self, _ir: &ReadOnlyExpression) -> Result<RenderedQuery, RenderError> {
            Ok(RenderedQuery {
                text: "RETURN 1".to_string(),
                params: HashMap::new(),
            })
        }
    }

    #[test]
    fn test_renderers_are_object_safe() {
        let renderers: Vec<Box<dyn QueryRenderer>> =
            vec![Box::new(MockRenderer), Box::new(CypherGenerator::default())];

        let names: Vec<_> = renderers.iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["mock", "cypher"]);

        let ir = ReadOnlyExpression::new();
        for renderer in &renderers {
            assert_eq!(renderer.render(&ir).unwrap().text, "RETURN 1");
        }
    }
}
