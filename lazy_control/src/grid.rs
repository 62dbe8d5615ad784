// src/grid.rs
//
// Dense row-major 2-D storage used for neighbor masks and pairwise
// (agent x agent) quantities. Shapes are always (num_agents_max, num_agents_max)
// in the environment; inactive rows/columns hold the default value.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid<T> {
    rows: usize,
    cols: usize,
    data: Vec<T>,
}

impl<T: Clone> Grid<T> {
    /// Create a grid with every cell set to `value`.
    pub fn filled(rows: usize, cols: usize, value: T) -> Self {
        Self {
            rows,
            cols,
            data: vec![value; rows * cols],
        }
    }

    /// Build a grid from a function of (row, col).
    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let mut data = Vec::with_capacity(rows * cols);
        for i in 0..rows {
            for j in 0..cols {
                data.push(f(i, j));
            }
        }
        Self { rows, cols, data }
    }

    pub fn map<U: Clone>(&self, mut f: impl FnMut(&T) -> U) -> Grid<U> {
        Grid {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(&mut f).collect(),
        }
    }
}

impl<T: Clone + Default> Grid<T> {
    /// Create a grid of default values.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self::filled(rows, cols, T::default())
    }
}

impl<T> Grid<T> {
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> &T {
        &self.data[i * self.cols + j]
    }

    #[inline]
    pub fn get_mut(&mut self, i: usize, j: usize) -> &mut T {
        &mut self.data[i * self.cols + j]
    }

    #[inline]
    pub fn set(&mut self, i: usize, j: usize, value: T) {
        self.data[i * self.cols + j] = value;
    }

    pub fn row(&self, i: usize) -> &[T] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.data.iter()
    }

    /// Rows as nested vectors (used by the Python bindings and CSV export).
    pub fn to_nested(&self) -> Vec<Vec<T>>
    where
        T: Clone,
    {
        (0..self.rows).map(|i| self.row(i).to_vec()).collect()
    }
}

impl Grid<bool> {
    /// Number of `true` cells in row `i`.
    pub fn row_count(&self, i: usize) -> usize {
        self.row(i).iter().filter(|&&b| b).count()
    }

    /// Elementwise AND with another mask of the same shape.
    pub fn and(&self, other: &Grid<bool>) -> Grid<bool> {
        debug_assert_eq!(self.shape(), other.shape());
        Grid {
            rows: self.rows,
            cols: self.cols,
            data: self
                .data
                .iter()
                .zip(other.data.iter())
                .map(|(a, b)| *a && *b)
                .collect(),
        }
    }

    /// Outer product of a padding mask with itself: `m[i] && m[j]`.
    pub fn active_pairs(padding_mask: &[bool]) -> Grid<bool> {
        let n = padding_mask.len();
        Grid::from_fn(n, n, |i, j| padding_mask[i] && padding_mask[j])
    }

    /// Symmetric check used by topology tests.
    pub fn is_symmetric(&self) -> bool {
        if self.rows != self.cols {
            return false;
        }
        (0..self.rows).all(|i| (0..self.cols).all(|j| self.get(i, j) == self.get(j, i)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_fn_row_major() {
        let g = Grid::from_fn(2, 3, |i, j| i * 10 + j);
        assert_eq!(g.row(0), &[0, 1, 2]);
        assert_eq!(g.row(1), &[10, 11, 12]);
        assert_eq!(*g.get(1, 2), 12);
    }

    #[test]
    fn test_active_pairs() {
        let m = Grid::active_pairs(&[true, false, true]);
        assert!(*m.get(0, 2));
        assert!(!*m.get(0, 1));
        assert!(!*m.get(1, 1));
        assert_eq!(m.row_count(2), 2);
        assert!(m.is_symmetric());
    }
}
