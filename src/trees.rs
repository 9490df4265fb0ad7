//! Structural types exposed by tree-ensemble classifiers.

use serde::{Deserialize, Serialize};

/// A terminal node of a decision tree.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct LeafNode {
    /// Index of the tree this leaf belongs to.
    pub tree_id: usize,
    /// Position of the leaf within its tree.
    pub node_id: usize,
    /// Class the leaf votes for.
    pub class_label: usize,
    /// Leaf score contributed to that class.
    pub value: f32,
}

/// A single decision tree of an ensemble, reduced to the structure attack
/// and verification algorithms need: which class it scores and its leaves.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Tree {
    /// Class this tree contributes to, or `None` for shared trees.
    pub class_id: Option<usize>,
    pub leaf_nodes: Vec<LeafNode>,
}

impl Tree {
    pub fn new(class_id: Option<usize>, leaf_nodes: Vec<LeafNode>) -> Self {
        Tree {
            class_id,
            leaf_nodes,
        }
    }
}
