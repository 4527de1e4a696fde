/**
 * A field is a dense, row-major array of scalar values over one partition of
 * the global grid, padded by one row and one column on every side. Rows index
 * the vertical (partition-split) axis and grow upward: row 0 is the bottom
 * ghost row and row `rows + 1` is the top ghost row. Columns 0 and
 * `cols + 1` are the physical side walls.
 */
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}




// ============================================================================
impl Field {




    /**
     * Generate a field of zeros with the given number of interior rows and
     * columns.
     */
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; (rows + 2) * (cols + 2)],
        }
    }




    /**
     * Generate a field with values defined from a closure of the storage
     * index `(i, j)`, ghosts included.
     */
    pub fn from_function<F>(rows: usize, cols: usize, f: F) -> Self
    where
        F: Fn(usize, usize) -> f64,
    {
        let n = cols + 2;
        Self {
            rows,
            cols,
            data: (0..(rows + 2) * n).map(|k| f(k / n, k % n)).collect(),
        }
    }




    /**
     * Return the number of interior rows and columns.
     */
    pub fn interior_shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }




    /**
     * Return the logical dimensions (the memory extent) of the backing array,
     * ghosts included.
     */
    pub fn dim(&self) -> (usize, usize) {
        (self.rows + 2, self.cols + 2)
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.validate_index(i, j);
        self.data[i * (self.cols + 2) + j]
    }

    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        self.validate_index(i, j);
        self.data[i * (self.cols + 2) + j] = value
    }

    pub fn row(&self, i: usize) -> &[f64] {
        let n = self.cols + 2;
        &self.data[i * n..(i + 1) * n]
    }

    pub fn row_mut(&mut self, i: usize) -> &mut [f64] {
        let n = self.cols + 2;
        &mut self.data[i * n..(i + 1) * n]
    }

    /// The raw row-major buffer, ghosts included.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    fn validate_index(&self, i: usize, j: usize) {
        if i >= self.rows + 2 || j >= self.cols + 2 {
            panic!(
                "index ({} {}) out of range on field (0..{} 0..{})",
                i,
                j,
                self.rows + 2,
                self.cols + 2
            );
        }
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::Field;

    #[test]
    fn field_layout_is_row_major_with_ghosts() {
        let field = Field::from_function(2, 3, |i, j| (i * 10 + j) as f64);
        assert_eq!(field.dim(), (4, 5));
        assert_eq!(field.interior_shape(), (2, 3));
        assert_eq!(field.as_slice().len(), 20);
        assert_eq!(field.get(0, 0), 0.0);
        assert_eq!(field.get(2, 4), 24.0);
        assert_eq!(field.row(3), &[30.0, 31.0, 32.0, 33.0, 34.0]);
        assert_eq!(field.as_slice()[7], 12.0);
    }

    #[test]
    fn row_mut_writes_through() {
        let mut field = Field::zeros(2, 2);
        field.row_mut(1).copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(field.get(1, 2), 3.0);
        field.set(3, 3, 9.0);
        assert_eq!(field.as_slice()[15], 9.0);
    }

    #[test]
    #[should_panic]
    fn out_of_range_index_panics() {
        Field::zeros(2, 2).get(4, 0);
    }
}
