use ndarray::{s, Array2, ArrayView1, ArrayView2, Axis};

/// Block size used by the provided [`PointSource::scan`].
const SCAN_BLOCK: usize = 4_096;

/// Read-only collection of fixed-dimension points.
///
/// Implementations must return blocks in the same order on every call so
/// that per-point data (such as previous assignments) lines up between
/// iterations. Scans are restartable and never mutate the source.
pub trait PointSource: Sync {
    /// Number of points
    fn count(&self) -> usize;

    /// Number of features of every point
    fn n_features(&self) -> usize;

    /// Contiguous row blocks of at most `block_size` points covering the
    /// whole source. A `block_size` of 0 yields a single block.
    fn blocks(&self, block_size: usize) -> Vec<ArrayView2<'_, f32>>;

    /// Lazily iterate over every point
    fn scan(&self) -> Box<dyn Iterator<Item = ArrayView1<'_, f32>> + '_> {
        Box::new(self.blocks(SCAN_BLOCK).into_iter().flat_map(|block| {
            let n = block.nrows();
            (0..n).map(move |i| block.clone().index_axis_move(Axis(0), i))
        }))
    }
}

fn split_rows<'a>(data: ArrayView2<'a, f32>, block_size: usize) -> Vec<ArrayView2<'a, f32>> {
    let n = data.nrows();
    if block_size == 0 || n <= block_size {
        return vec![data];
    }

    let mut blocks = Vec::with_capacity(n.div_ceil(block_size));
    let mut start_idx = 0;
    while start_idx < n {
        let end_idx = (start_idx + block_size).min(n);
        blocks.push(data.slice_move(s![start_idx..end_idx, ..]));
        start_idx = end_idx;
    }
    blocks
}

impl PointSource for Array2<f32> {
    fn count(&self) -> usize {
        self.nrows()
    }

    fn n_features(&self) -> usize {
        self.ncols()
    }

    fn blocks(&self, block_size: usize) -> Vec<ArrayView2<'_, f32>> {
        split_rows(self.view(), block_size)
    }
}

impl<'a> PointSource for ArrayView2<'a, f32> {
    fn count(&self) -> usize {
        self.nrows()
    }

    fn n_features(&self) -> usize {
        self.ncols()
    }

    fn blocks(&self, block_size: usize) -> Vec<ArrayView2<'_, f32>> {
        split_rows(self.view(), block_size)
    }
}
