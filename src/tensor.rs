/// Model output scores: `rows` timesteps of `cols` vocabulary scores, row-major.
///
/// Produced once per inference call and only read afterwards; the decoder and the
/// confidence scorer each borrow it independently.
#[derive(Clone, Debug, PartialEq)]
pub struct OutputTensor {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl OutputTensor {
    /// Wraps a row-major buffer. `data.len()` must equal `rows * cols`.
    pub fn new(rows: usize, cols: usize, data: Vec<f32>) -> Option<Self> {
        if rows.checked_mul(cols)? != data.len() {
            return None;
        }
        Some(Self { rows, cols, data })
    }

    pub fn empty() -> Self {
        Self {
            rows: 0,
            cols: 0,
            data: Vec::new(),
        }
    }

    /// Builds a tensor from per-timestep rows; rows shorter than the widest one are
    /// padded with negative infinity so they never win an arg-max.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Self {
        let cols = rows.iter().map(Vec::len).max().unwrap_or(0);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in &rows {
            data.extend_from_slice(row);
            data.extend(std::iter::repeat(f32::NEG_INFINITY).take(cols - row.len()));
        }
        Self {
            rows: rows.len(),
            cols,
            data,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn row(&self, idx: usize) -> Option<&[f32]> {
        if idx >= self.rows {
            return None;
        }
        let start = idx * self.cols;
        Some(&self.data[start..start + self.cols])
    }

    /// Iterates timesteps in order. A zero-column tensor yields empty rows.
    pub fn iter_rows(&self) -> impl Iterator<Item = &[f32]> + '_ {
        (0..self.rows).map(move |i| {
            let start = i * self.cols;
            &self.data[start..start + self.cols]
        })
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}
