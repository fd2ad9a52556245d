//! Graph patterns: nodes joined by relationships.

use std::sync::Arc;

/// A node in a pattern, e.g. `(w:Warehouse)`.
///
/// Storage expressions hold an `Arc` to the node they bind against, so a
/// node is shared by the pattern and every property reference to it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NodePattern {
    pub alias: Option<String>,
    pub labels: Vec<String>,
}

impl NodePattern {
    pub fn new(alias: impl Into<String>) -> Self {
        Self {
            alias: Some(alias.into()),
            labels: Vec::new(),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels.extend(labels.into_iter().map(Into::into));
        self
    }

    pub fn shared(self) -> Arc<NodePattern> {
        Arc::new(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelationshipDirection {
    /// `<-[..]->`
    Both,
    /// `<-[..]-`
    Left,
    /// `-[..]->`
    Right,
    /// `-[..]-`
    #[default]
    Undirected,
}

/// Variable-length bounds, `*lower..upper`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HopRange {
    pub lower: Option<u32>,
    pub upper: Option<u32>,
}

impl HopRange {
    pub fn new(lower: Option<u32>, upper: Option<u32>) -> Self {
        Self { lower, upper }
    }
}

/// Bracketed part of a relationship, `[r:"OWNS"|:"USES"*1..3]`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RelationshipDetail {
    pub alias: Option<String>,
    pub kinds: Vec<String>,
    pub range: Option<HopRange>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RelationshipPattern {
    pub direction: RelationshipDirection,
    /// Absent detail renders as a bare `--`
    pub detail: Option<RelationshipDetail>,
}

impl RelationshipPattern {
    pub fn new(direction: RelationshipDirection) -> Self {
        Self {
            direction,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: RelationshipDetail) -> Self {
        self.detail = Some(detail);
        self
    }
}

/// A node followed by zero or more relationship/node steps.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pub start: Arc<NodePattern>,
    pub steps: Vec<(RelationshipPattern, Arc<NodePattern>)>,
}

impl Pattern {
    pub fn new(start: Arc<NodePattern>) -> Self {
        Self {
            start,
            steps: Vec::new(),
        }
    }

    pub fn then(mut self, relationship: RelationshipPattern, node: Arc<NodePattern>) -> Self {
        self.steps.push((relationship, node));
        self
    }

    /// Last node of the chain; the node bound to the clause's source.
    pub fn terminal_node(&self) -> &Arc<NodePattern> {
        self.steps
            .last()
            .map(|(_, node)| node)
            .unwrap_or(&self.start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_node() {
        let start = NodePattern::new("o").shared();
        let end = NodePattern::new("i").with_label("Thing").shared();

        let single = Pattern::new(start.clone());
        assert_eq!(single.terminal_node(), &start);

        let chained = single.then(
            RelationshipPattern::new(RelationshipDirection::Right),
            end.clone(),
        );
        assert!(Arc::ptr_eq(chained.terminal_node(), &end));
    }
}
