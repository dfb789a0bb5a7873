//! Decision tree and forest representation.
//!
//! Trees are stored as flat node vectors with the root at index 0. Numeric
//! splits send a row left when `value < threshold`; categorical splits send a
//! row right when its category code is in the split's bit set. Missing values
//! (`NaN` for numeric features, code 0 for categorical ones) follow the
//! split's default direction, chosen at training time as the side that
//! received more rows.

use fixedbitset::FixedBitSet;
use serde::{Deserialize, Serialize};

/// The split test applied at an internal node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SplitTest {
    /// Go left if `value < threshold`.
    Threshold(f32),
    /// Go right if the category code is in the set.
    Categories(FixedBitSet),
}

/// A tree node: either an internal split or a leaf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    Split {
        /// Index into the serving feature layout.
        feature: u32,
        test: SplitTest,
        left: u32,
        right: u32,
        /// Direction for missing values.
        default_left: bool,
    },
    Leaf {
        /// Length is the forest's `n_groups`.
        distribution: Vec<f32>,
    },
}

/// A single decision tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    /// Wrap a node vector; the root is node 0.
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    /// All nodes, root first.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Mutable node access, used by the trainer to patch leaf values.
    pub(crate) fn nodes_mut(&mut self) -> &mut [Node] {
        &mut self.nodes
    }

    /// Number of nodes.
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Traverse to the leaf index for a row of feature values.
    ///
    /// `row[f]` holds the numeric value or the category code (as `f32`) of
    /// feature `f` in the serving layout.
    pub fn leaf_for(&self, row: &[f32]) -> usize {
        let mut idx = 0usize;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { .. } => return idx,
                Node::Split {
                    feature,
                    test,
                    left,
                    right,
                    default_left,
                } => {
                    let value = row[*feature as usize];
                    let go_left = match test {
                        SplitTest::Threshold(threshold) => {
                            if value.is_nan() {
                                *default_left
                            } else {
                                value < *threshold
                            }
                        }
                        SplitTest::Categories(set) => {
                            let code = value as usize;
                            if value.is_nan() || code == 0 {
                                *default_left
                            } else {
                                !set.contains(code)
                            }
                        }
                    };
                    idx = if go_left { *left as usize } else { *right as usize };
                }
            }
        }
    }

    /// The leaf distribution reached by a row.
    pub fn distribution_for(&self, row: &[f32]) -> &[f32] {
        match &self.nodes[self.leaf_for(row)] {
            Node::Leaf { distribution } => distribution,
            // leaf_for only ever returns leaf indices
            Node::Split { .. } => unreachable!("leaf_for returned an internal node"),
        }
    }
}

/// How per-tree outputs are combined across the forest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Combiner {
    /// Average of leaf distributions (random forest, CART).
    Average,
    /// Sum of leaf values on top of the base score (gradient boosting).
    Sum,
}

/// Transform applied to the combined output before scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputTransform {
    /// Raw combined value.
    Identity,
    /// Sigmoid over a single margin (binary logistic boosting).
    Logistic,
}

/// A trained decision forest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forest {
    pub trees: Vec<Tree>,
    /// Output width of every leaf distribution.
    pub n_groups: usize,
    /// Starting point for combination, length `n_groups`.
    pub base_scores: Vec<f32>,
    pub combiner: Combiner,
    pub transform: OutputTransform,
}

impl Forest {
    /// Number of trees.
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Combined (pre-transform) output for one row.
    pub fn raw_output(&self, row: &[f32]) -> Vec<f32> {
        let mut out = self.base_scores.clone();
        for tree in &self.trees {
            let dist = tree.distribution_for(row);
            for (acc, v) in out.iter_mut().zip(dist) {
                *acc += v;
            }
        }
        if self.combiner == Combiner::Average && !self.trees.is_empty() {
            let scale = 1.0 / self.trees.len() as f32;
            for acc in &mut out {
                *acc *= scale;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stump(threshold: f32) -> Tree {
        Tree::new(vec![
            Node::Split {
                feature: 0,
                test: SplitTest::Threshold(threshold),
                left: 1,
                right: 2,
                default_left: true,
            },
            Node::Leaf {
                distribution: vec![1.0, 0.0],
            },
            Node::Leaf {
                distribution: vec![0.0, 1.0],
            },
        ])
    }

    #[test]
    fn numeric_traversal() {
        let tree = stump(5.0);
        assert_eq!(tree.distribution_for(&[1.0]), &[1.0, 0.0]);
        assert_eq!(tree.distribution_for(&[9.0]), &[0.0, 1.0]);
        // Exactly at the threshold goes right.
        assert_eq!(tree.distribution_for(&[5.0]), &[0.0, 1.0]);
    }

    #[test]
    fn missing_numeric_follows_default() {
        let tree = stump(5.0);
        assert_eq!(tree.distribution_for(&[f32::NAN]), &[1.0, 0.0]);
    }

    #[test]
    fn categorical_traversal_and_sentinel() {
        // Codes {2, 3} go right; everything else (including the sentinel 0)
        // goes left because default_left is true.
        let mut set = FixedBitSet::with_capacity(4);
        set.insert(2);
        set.insert(3);
        let tree = Tree::new(vec![
            Node::Split {
                feature: 0,
                test: SplitTest::Categories(set),
                left: 1,
                right: 2,
                default_left: true,
            },
            Node::Leaf {
                distribution: vec![-1.0],
            },
            Node::Leaf {
                distribution: vec![1.0],
            },
        ]);

        assert_eq!(tree.distribution_for(&[1.0]), &[-1.0]);
        assert_eq!(tree.distribution_for(&[2.0]), &[1.0]);
        assert_eq!(tree.distribution_for(&[0.0]), &[-1.0]); // sentinel
    }

    #[test]
    fn forest_average_and_sum() {
        let forest = Forest {
            trees: vec![stump(5.0), stump(3.0)],
            n_groups: 2,
            base_scores: vec![0.0, 0.0],
            combiner: Combiner::Average,
            transform: OutputTransform::Identity,
        };
        // Row 4.0: tree one says class 0, tree two says class 1.
        assert_eq!(forest.raw_output(&[4.0]), vec![0.5, 0.5]);

        let forest = Forest {
            combiner: Combiner::Sum,
            base_scores: vec![1.0, 1.0],
            ..forest
        };
        assert_eq!(forest.raw_output(&[4.0]), vec![2.0, 2.0]);
    }
}
