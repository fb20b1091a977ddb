use crate::data::{JaggedMatrix, Matrix};
use crate::utils::{map_bin, percentiles};

/// If there are fewer unique values than their are
/// percentiles, just return the unique values of the
/// vectors.
///
/// * `v` - A numeric slice to calculate percentiles for.
/// * `pcts` - Percentiles to cut at.
fn percentiles_or_value(v: &[f64], pcts: &[f64]) -> Vec<f64> {
    let mut v_u = v.to_owned();
    v_u.sort_unstable_by(|a, b| a.total_cmp(b));
    v_u.dedup();
    if v_u.len() <= pcts.len() + 1 {
        v_u
    } else {
        let w = vec![1.0; v.len()];
        percentiles(v, &w, pcts)
    }
}

// Each feature is bucketed into bins 0 to N, where bin 0 holds missing
// values and bin b >= 1 holds values in [cuts[b - 1], cuts[b]).
// The last cut is always f64::MAX.
#[derive(Debug)]
pub struct BinnedData {
    pub binned_data: Vec<u16>,
    pub cuts: JaggedMatrix<f64>,
    pub nunique: Vec<usize>,
}

impl BinnedData {
    /// Number of bins used by a column, counting the missing bin.
    pub fn n_bins(&self, col: usize) -> usize {
        self.nunique[col] + 1
    }
}

/// Bin a numeric matrix.
///
/// * `data` - A numeric matrix, of data to be binned.
/// * `nbins` - The number of bins each column should be binned into.
pub fn bin_matrix(data: &Matrix<f64>, nbins: u16) -> BinnedData {
    let pcts: Vec<f64> = (0..nbins).map(|i| f64::from(i) / f64::from(nbins)).collect();

    let mut cuts = JaggedMatrix::new();
    let mut nunique = Vec::with_capacity(data.cols);
    for i in 0..data.cols {
        let no_miss: Vec<f64> = data.get_col(i).iter().copied().filter(|v| !v.is_nan()).collect();
        let mut col_cuts = percentiles_or_value(&no_miss, &pcts);
        col_cuts.push(f64::MAX);
        col_cuts.dedup();
        nunique.push(col_cuts.len());
        cuts.push_col(col_cuts);
    }

    // Cut counts are bounded by nbins + 2, well inside u16.
    let binned_data = data
        .data
        .iter()
        .enumerate()
        .map(|(i, v)| map_bin(cuts.get_col(i / data.rows), *v).unwrap_or(u16::MAX))
        .collect();

    BinnedData {
        binned_data,
        cuts,
        nunique,
    }
}
