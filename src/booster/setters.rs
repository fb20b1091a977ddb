use crate::booster::QuantileBooster;

impl QuantileBooster {
    // Set methods for paramters

    /// Set the number of boosting rounds.
    pub fn set_n_estimators(mut self, n_estimators: usize) -> Self {
        self.cfg.n_estimators = n_estimators;
        self
    }

    /// Set the learning rate.
    pub fn set_learning_rate(mut self, learning_rate: f64) -> Self {
        self.cfg.learning_rate = learning_rate;
        self
    }

    /// Set the maximum number of leaves per tree.
    pub fn set_num_leaves(mut self, num_leaves: usize) -> Self {
        self.cfg.num_leaves = num_leaves;
        self
    }

    /// Set the maximum depth per tree.
    pub fn set_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.cfg.max_depth = max_depth;
        self
    }

    /// Set the minimum number of rows in a leaf.
    pub fn set_min_data_in_leaf(mut self, min_data_in_leaf: usize) -> Self {
        self.cfg.min_data_in_leaf = min_data_in_leaf;
        self
    }

    /// Set the number of bins.
    /// * `max_bin` - Number of bins to calculate to partition the data. If there are
    ///   more bins than unique values in a column, all unique values will be used.
    pub fn set_max_bin(mut self, max_bin: u16) -> Self {
        self.cfg.max_bin = max_bin;
        self
    }

    /// Set the share of rows sampled for each tree.
    pub fn set_subsample(mut self, subsample: f64) -> Self {
        self.cfg.subsample = subsample;
        self
    }

    /// Log progress every `log_iterations` rounds; zero disables logging.
    pub fn set_log_iterations(mut self, log_iterations: usize) -> Self {
        self.cfg.log_iterations = log_iterations;
        self
    }
}
