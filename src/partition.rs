/// A vertical slice of the global domain owned by one process (or thread)
/// in an SPMD group. Rank 0 owns the global bottom edge and rank `size - 1`
/// the global top edge.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Partition {
    pub rank: usize,
    pub size: usize,
}

impl Partition {
    pub fn new(rank: usize, size: usize) -> Self {
        Self { rank, size }
    }

    /// A group of one, which owns both physical edges.
    pub fn single() -> Self {
        Self::new(0, 1)
    }

    /// Number of interior rows in this slice. There is no remainder
    /// handling: rows left over by the integer division belong to nobody.
    ///
    pub fn slice_rows(&self, resolution: usize) -> usize {
        resolution / self.size
    }

    /// Global index of this slice's bottom ghost row.
    pub fn row_offset(&self, resolution: usize) -> usize {
        self.rank * self.slice_rows(resolution)
    }

    pub fn below(&self) -> Option<usize> {
        if self.rank == 0 {
            None
        } else {
            Some(self.rank - 1)
        }
    }

    pub fn above(&self) -> Option<usize> {
        if self.rank + 1 >= self.size {
            None
        } else {
            Some(self.rank + 1)
        }
    }

    pub fn owns_bottom(&self) -> bool {
        self.rank == 0
    }

    pub fn owns_top(&self) -> bool {
        self.rank + 1 == self.size
    }
}
