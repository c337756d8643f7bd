use ndarray::Array2;

/// One foreground pixel of the object map.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MapEntry {
    pub row: u32,
    pub col: u32,
    pub label: u32,
}

/// Sparse backing store for the labeled object map.
///
/// Most plate pixels are background, so only nonzero labels are kept. All
/// mutation paths funnel through [`SparseMap::from_dense`], which drops
/// explicit zeros; [`SparseMap::to_dense`] materializes the full label
/// matrix for reads and relabeling. Entries are kept in row-major order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SparseMap {
    shape: (usize, usize),
    entries: Vec<MapEntry>,
}

impl SparseMap {
    /// An all-background map of the given shape.
    pub fn empty(shape: (usize, usize)) -> Self {
        Self {
            shape,
            entries: Vec::new(),
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    /// True when no pixel carries a label.
    pub fn is_blank(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of labeled (foreground) pixels.
    pub fn nnz(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[MapEntry] {
        &self.entries
    }

    /// Build from a dense label matrix, eliminating zeros.
    pub fn from_dense(dense: &Array2<u32>) -> Self {
        let mut entries = Vec::new();
        for ((row, col), &label) in dense.indexed_iter() {
            if label != 0 {
                entries.push(MapEntry {
                    row: row as u32,
                    col: col as u32,
                    label,
                });
            }
        }
        Self {
            shape: dense.dim(),
            entries,
        }
    }

    /// Rebuild directly from foreground entries (used by the archive codec).
    /// Entries with label 0 are dropped.
    pub fn from_entries(shape: (usize, usize), entries: Vec<MapEntry>) -> Self {
        let mut entries: Vec<MapEntry> = entries.into_iter().filter(|e| e.label != 0).collect();
        entries.sort_by_key(|e| (e.row, e.col));
        Self { shape, entries }
    }

    /// Materialize the dense label matrix (0 = background).
    pub fn to_dense(&self) -> Array2<u32> {
        let mut dense = Array2::<u32>::zeros(self.shape);
        for e in &self.entries {
            dense[[e.row as usize, e.col as usize]] = e.label;
        }
        dense
    }

    /// Sorted distinct positive labels currently present.
    pub fn labels(&self) -> Vec<u32> {
        let mut labels: Vec<u32> = self.entries.iter().map(|e| e.label).collect();
        labels.sort_unstable();
        labels.dedup();
        labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn from_dense_eliminates_zeros() {
        let dense = array![[0u32, 2, 0], [1, 0, 2]];
        let sparse = SparseMap::from_dense(&dense);
        assert_eq!(sparse.nnz(), 3);
        assert_eq!(sparse.labels(), vec![1, 2]);
        assert_eq!(sparse.to_dense(), dense);
    }

    #[test]
    fn empty_map_is_blank() {
        let sparse = SparseMap::empty((4, 5));
        assert!(sparse.is_blank());
        assert_eq!(sparse.to_dense(), Array2::<u32>::zeros((4, 5)));
    }
}
