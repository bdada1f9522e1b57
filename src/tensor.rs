/// A single sample laid out as a row-major 2-D `f32` tensor.
///
/// Both input paths (encoded sequence text and preprocessed arrays) produce
/// this type, so the classifier only ever sees one shape contract.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleTensor {
    values: Vec<f32>,
    rows: usize,
    cols: usize,
}

impl SampleTensor {
    /// Wrap `values` as a `rows x cols` tensor. Returns `None` when the
    /// element count does not match the shape.
    pub fn new(values: Vec<f32>, rows: usize, cols: usize) -> Option<Self> {
        if rows.checked_mul(cols)? != values.len() {
            return None;
        }
        Some(Self { values, rows, cols })
    }

    /// A one-row tensor holding `values`.
    pub fn row(values: Vec<f32>) -> Self {
        let cols = values.len();
        Self {
            values,
            rows: 1,
            cols,
        }
    }

    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            values: vec![0.0; rows * cols],
            rows,
            cols,
        }
    }

    /// Set one element. Out-of-range positions are ignored.
    pub fn set(&mut self, row: usize, col: usize, value: f32) {
        if row < self.rows && col < self.cols {
            self.values[row * self.cols + col] = value;
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> [usize; 2] {
        [self.rows, self.cols]
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Row `index`, or `None` past the last row.
    pub fn row_values(&self, index: usize) -> Option<&[f32]> {
        if index >= self.rows {
            return None;
        }
        let start = index * self.cols;
        Some(&self.values[start..start + self.cols])
    }

    /// Collapse to a single-sample batch of shape `(1, rows * cols)`.
    pub fn flatten(self) -> Self {
        Self::row(self.values)
    }

    pub fn into_values(self) -> Vec<f32> {
        self.values
    }
}
