//! Tree
//!
//! Regression trees grown best-gain first on binned data. Split search uses
//! gradient histograms with a constant hessian; leaf outputs are filled in
//! afterwards by the caller, which knows the loss.
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::binning::BinnedData;
use crate::data::Matrix;

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Node {
    pub num: usize,
    pub weight_value: f64,
    pub depth: usize,
    pub split_value: f64,
    pub split_feature: usize,
    pub split_gain: f64,
    pub left_child: usize,
    pub right_child: usize,
    pub is_leaf: bool,
    pub counts: usize,
    #[serde(skip)]
    start_idx: usize,
    #[serde(skip)]
    stop_idx: usize,
}

impl Node {
    fn leaf(num: usize, depth: usize, start_idx: usize, stop_idx: usize) -> Self {
        Node {
            num,
            weight_value: 0.0,
            depth,
            split_value: 0.0,
            split_feature: 0,
            split_gain: 0.0,
            left_child: 0,
            right_child: 0,
            is_leaf: true,
            counts: stop_idx - start_idx,
            start_idx,
            stop_idx,
        }
    }

    /// Get the path that should be traveled down, given a value.
    /// Missing values go left.
    #[inline]
    pub fn get_child_idx(&self, v: f64) -> usize {
        if v.is_nan() || v < self.split_value {
            self.left_child
        } else {
            self.right_child
        }
    }
}

/// Growth limits for a single tree.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    pub num_leaves: usize,
    pub max_depth: Option<usize>,
    pub min_data_in_leaf: usize,
    pub min_split_gain: f64,
}

#[derive(Debug)]
struct SplittableNode {
    num: usize,
    gain: f64,
    feature: usize,
    bin: u16,
    split_value: f64,
}

impl Ord for SplittableNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Ties go to the older node so growth is deterministic.
        self.gain.total_cmp(&other.gain).then_with(|| other.num.cmp(&self.num))
    }
}

impl PartialOrd for SplittableNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SplittableNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SplittableNode {}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

fn gain(gradient_sum: f64, counts: usize) -> f64 {
    gradient_sum * gradient_sum / counts as f64
}

impl Tree {
    /// Grow a tree on the rows in `index`. `index` is reordered so that the
    /// rows of every leaf are contiguous.
    pub fn grow(binned: &BinnedData, rows: usize, index: &mut [usize], grad: &[f32], params: &TreeParams) -> Tree {
        let mut tree = Tree {
            nodes: vec![Node::leaf(0, 0, 0, index.len())],
        };
        let mut growable = BinaryHeap::new();
        if let Some(s) = tree.best_split(0, binned, rows, index, grad, params) {
            growable.push(s);
        }

        let mut n_leaves = 1;
        while let Some(split) = growable.pop() {
            if n_leaves >= params.num_leaves {
                break;
            }
            let (start, stop, depth) = {
                let n = &tree.nodes[split.num];
                (n.start_idx, n.stop_idx, n.depth)
            };
            let col = &binned.binned_data[split.feature * rows..(split.feature + 1) * rows];
            let (left, right): (Vec<usize>, Vec<usize>) = index[start..stop].iter().partition(|i| col[**i] < split.bin);
            let mid = start + left.len();
            index[start..mid].copy_from_slice(&left);
            index[mid..stop].copy_from_slice(&right);

            let left_num = tree.nodes.len();
            let right_num = left_num + 1;
            tree.nodes.push(Node::leaf(left_num, depth + 1, start, mid));
            tree.nodes.push(Node::leaf(right_num, depth + 1, mid, stop));
            let parent = &mut tree.nodes[split.num];
            parent.is_leaf = false;
            parent.split_feature = split.feature;
            parent.split_value = split.split_value;
            parent.split_gain = split.gain;
            parent.left_child = left_num;
            parent.right_child = right_num;
            n_leaves += 1;

            for child in [left_num, right_num] {
                if let Some(s) = tree.best_split(child, binned, rows, index, grad, params) {
                    growable.push(s);
                }
            }
        }
        tree
    }

    fn best_split(
        &self,
        num: usize,
        binned: &BinnedData,
        rows: usize,
        index: &[usize],
        grad: &[f32],
        params: &TreeParams,
    ) -> Option<SplittableNode> {
        let node = &self.nodes[num];
        if let Some(max_depth) = params.max_depth {
            if node.depth >= max_depth {
                return None;
            }
        }
        let node_index = &index[node.start_idx..node.stop_idx];
        let n = node_index.len();
        if n < 2 * params.min_data_in_leaf.max(1) {
            return None;
        }
        let g_total: f64 = node_index.iter().map(|i| f64::from(grad[*i])).sum();
        let parent_gain = gain(g_total, n);

        let mut best: Option<SplittableNode> = None;
        for feature in 0..binned.cuts.cols() {
            let n_bins = binned.n_bins(feature);
            let col = &binned.binned_data[feature * rows..(feature + 1) * rows];
            let mut hist_g = vec![0.0_f64; n_bins];
            let mut hist_n = vec![0_usize; n_bins];
            for i in node_index {
                let b = usize::from(col[*i]);
                hist_g[b] += f64::from(grad[*i]);
                hist_n[b] += 1;
            }
            let cuts = binned.cuts.get_col(feature);
            let mut g_left = 0.0;
            let mut n_left = 0;
            for bin in 1..n_bins {
                g_left += hist_g[bin - 1];
                n_left += hist_n[bin - 1];
                let n_right = n - n_left;
                if n_left < params.min_data_in_leaf || n_right < params.min_data_in_leaf {
                    continue;
                }
                if n_left == 0 || n_right == 0 {
                    continue;
                }
                let split_gain = gain(g_left, n_left) + gain(g_total - g_left, n_right) - parent_gain;
                if split_gain <= params.min_split_gain {
                    continue;
                }
                if best.as_ref().map_or(true, |b| split_gain > b.gain) {
                    best = Some(SplittableNode {
                        num,
                        gain: split_gain,
                        feature,
                        bin: bin as u16,
                        split_value: cuts[bin - 1],
                    });
                }
            }
        }
        best
    }

    /// Set each leaf's output from the rows that landed in it.
    pub fn refit_leaves<F: Fn(&[usize]) -> f64>(&mut self, index: &[usize], leaf_value: F) {
        for node in self.nodes.iter_mut().filter(|n| n.is_leaf) {
            node.weight_value = leaf_value(&index[node.start_idx..node.stop_idx]);
        }
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf).count()
    }

    pub fn depth(&self) -> usize {
        self.nodes.iter().map(|n| n.depth).max().unwrap_or(0)
    }

    pub fn predict_row(&self, data: &Matrix<f64>, row: usize) -> f64 {
        let mut node_idx = 0;
        loop {
            let node = &self.nodes[node_idx];
            if node.is_leaf {
                return node.weight_value;
            }
            node_idx = node.get_child_idx(*data.get(row, node.split_feature));
        }
    }

    pub fn predict(&self, data: &Matrix<f64>) -> Vec<f64> {
        (0..data.rows).map(|r| self.predict_row(data, r)).collect()
    }

    /// Add each split's gain to its feature's total.
    pub fn accumulate_gain(&self, totals: &mut [f64]) {
        for node in self.nodes.iter().filter(|n| !n.is_leaf) {
            totals[node.split_feature] += node.split_gain;
        }
    }
}
