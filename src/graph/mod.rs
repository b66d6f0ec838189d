// Version graph — append-only forest of document nodes linked by parent id
//
// The protocol runner is the only writer of new nodes. The surrounding
// application shares the same graph and may add confirmations, refutations,
// annotations and scores to existing nodes, but nodes are never removed or
// reordered.

pub mod document;

pub use document::{
    insert_score, Annotation, AnnotationAuthor, DocumentVersion, GenerationMethod, NewDocument,
    PromptSnapshot, ProtocolLink, ReasoningStep, Refutation, ScoreMap, AI_RATER,
};

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Graph shared between the runner and the surrounding application
pub type SharedGraph = Arc<RwLock<VersionGraph>>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("node {0} already exists")]
    DuplicateNode(String),
    #[error("parent {parent} of node {node} is not in the graph")]
    UnknownParent { node: String, parent: String },
    #[error("node {0} not found")]
    UnknownNode(String),
    #[error("annotation {annotation} not found on node {node}")]
    UnknownAnnotation { node: String, annotation: String },
}

#[derive(Debug, Default)]
pub struct VersionGraph {
    nodes: Vec<DocumentVersion>,
    index: HashMap<String, usize>,
}

impl VersionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedGraph {
        Arc::new(RwLock::new(Self::new()))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in creation order.
    pub fn nodes(&self) -> &[DocumentVersion] {
        &self.nodes
    }

    pub fn get(&self, id: &str) -> Option<&DocumentVersion> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    /// Append a node. Its parent, if any, must already be present.
    pub fn append(&mut self, node: DocumentVersion) -> Result<(), GraphError> {
        if self.index.contains_key(node.id()) {
            return Err(GraphError::DuplicateNode(node.id().to_string()));
        }
        if let Some(parent) = node.parent_id() {
            if !self.index.contains_key(parent) {
                return Err(GraphError::UnknownParent {
                    node: node.id().to_string(),
                    parent: parent.to_string(),
                });
            }
        }
        self.index.insert(node.id().to_string(), self.nodes.len());
        self.nodes.push(node);
        Ok(())
    }

    /// Direct children of a node, in creation order.
    pub fn children(&self, id: &str) -> Vec<&DocumentVersion> {
        self.nodes
            .iter()
            .filter(|n| n.parent_id() == Some(id))
            .collect()
    }

    /// Ancestry of a node from its root down to the node itself.
    pub fn lineage(&self, id: &str) -> Vec<&DocumentVersion> {
        let mut chain = Vec::new();
        let mut cursor = self.get(id);
        while let Some(node) = cursor {
            chain.push(node);
            cursor = node.parent_id().and_then(|p| self.get(p));
        }
        chain.reverse();
        chain
    }

    fn node_mut(&mut self, id: &str) -> Result<&mut DocumentVersion, GraphError> {
        match self.index.get(id) {
            Some(&i) => Ok(&mut self.nodes[i]),
            None => Err(GraphError::UnknownNode(id.to_string())),
        }
    }

    pub fn add_annotations(
        &mut self,
        node_id: &str,
        annotations: impl IntoIterator<Item = Annotation>,
    ) -> Result<(), GraphError> {
        self.node_mut(node_id)?.annotations.extend(annotations);
        Ok(())
    }

    pub fn set_score(
        &mut self,
        node_id: &str,
        category: &str,
        rater: &str,
        value: i64,
    ) -> Result<(), GraphError> {
        insert_score(&mut self.node_mut(node_id)?.scores, category, rater, value);
        Ok(())
    }

    pub fn confirm(
        &mut self,
        node_id: &str,
        annotation_id: &str,
        reviewer: &str,
    ) -> Result<(), GraphError> {
        self.annotation_mut(node_id, annotation_id)?
            .confirmations
            .insert(reviewer.to_string());
        Ok(())
    }

    pub fn refute(
        &mut self,
        node_id: &str,
        annotation_id: &str,
        reviewer: &str,
        reason: &str,
    ) -> Result<(), GraphError> {
        self.annotation_mut(node_id, annotation_id)?
            .refutations
            .push(Refutation {
                reviewer: reviewer.to_string(),
                reason: reason.to_string(),
                timestamp: Utc::now(),
            });
        Ok(())
    }

    fn annotation_mut(
        &mut self,
        node_id: &str,
        annotation_id: &str,
    ) -> Result<&mut Annotation, GraphError> {
        let node = self.node_mut(node_id)?;
        node.annotations
            .iter_mut()
            .find(|a| a.id == annotation_id)
            .ok_or_else(|| GraphError::UnknownAnnotation {
                node: node_id.to_string(),
                annotation: annotation_id.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usage::TokenUsage;

    fn node(parent: Option<&str>, content: &str) -> DocumentVersion {
        DocumentVersion::create(NewDocument {
            parent_id: parent.map(str::to_string),
            content: content.to_string(),
            reasoning: None,
            method: GenerationMethod::Standard,
            prompts: PromptSnapshot::default(),
            annotations: vec![Annotation::new(
                "quote",
                "clarity",
                "unclear",
                AnnotationAuthor::Evaluator,
            )],
            scores: ScoreMap::new(),
            usage: TokenUsage::default(),
            diff: None,
            protocol: None,
        })
    }

    #[test]
    fn test_append_and_lineage() {
        let mut graph = VersionGraph::new();
        let root = node(None, "v1");
        let root_id = root.id().to_string();
        graph.append(root).unwrap();
        let child = node(Some(&root_id), "v2");
        let child_id = child.id().to_string();
        graph.append(child).unwrap();

        let lineage: Vec<&str> = graph.lineage(&child_id).iter().map(|n| n.content()).collect();
        assert_eq!(lineage, vec!["v1", "v2"]);
        assert_eq!(graph.children(&root_id).len(), 1);
    }

    #[test]
    fn test_append_rejects_unknown_parent() {
        let mut graph = VersionGraph::new();
        let err = graph.append(node(Some("missing"), "orphan")).unwrap_err();
        assert!(matches!(err, GraphError::UnknownParent { .. }));
        assert!(graph.is_empty());
    }

    #[test]
    fn test_append_rejects_duplicate() {
        let mut graph = VersionGraph::new();
        let n = node(None, "v1");
        graph.append(n.clone()).unwrap();
        assert!(matches!(graph.append(n), Err(GraphError::DuplicateNode(_))));
    }

    #[test]
    fn test_reviewer_mutations() {
        let mut graph = VersionGraph::new();
        let n = node(None, "v1");
        let id = n.id().to_string();
        let ann_id = n.annotations()[0].id.clone();
        graph.append(n).unwrap();

        graph.confirm(&id, &ann_id, "rev-a").unwrap();
        graph.confirm(&id, &ann_id, "rev-a").unwrap();
        graph.refute(&id, &ann_id, "rev-b", "quote not present").unwrap();
        graph.set_score(&id, "clarity", "rev-a", 55).unwrap();

        let stored = graph.get(&id).unwrap();
        assert_eq!(stored.annotations()[0].confirmations.len(), 1);
        assert!(stored.annotations()[0].is_refuted());
        assert_eq!(stored.score("clarity", "rev-a"), Some(55));
        assert_eq!(stored.content(), "v1");
    }

    #[test]
    fn test_mutation_on_unknown_annotation() {
        let mut graph = VersionGraph::new();
        let n = node(None, "v1");
        let id = n.id().to_string();
        graph.append(n).unwrap();
        assert!(matches!(
            graph.confirm(&id, "nope", "rev"),
            Err(GraphError::UnknownAnnotation { .. })
        ));
    }
}
