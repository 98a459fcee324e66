//! Dense N-dimensional grid
//!
//! Cells are stored in a single boxed slice; axis 0 varies fastest, so a
//! 3D coordinate `[x, y, z]` flattens to `x + X * (y + Y * z)`.

use std::ops::{Index, IndexMut};

#[derive(Debug, Clone, PartialEq)]
pub struct Grid<T, const N: usize> {
    dims: [usize; N],
    cells: Box<[T]>,
}

pub type Grid2<T> = Grid<T, 2>;
pub type Grid3<T> = Grid<T, 3>;

impl<T: Clone, const N: usize> Grid<T, N> {
    pub fn new(dims: [usize; N], fill: T) -> Self {
        let len = dims.iter().product();
        Self {
            dims,
            cells: vec![fill; len].into_boxed_slice(),
        }
    }

    pub fn fill(&mut self, value: T) {
        self.cells.fill(value);
    }
}

impl<T, const N: usize> Grid<T, N> {
    pub fn dims(&self) -> [usize; N] {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn contains(&self, coord: [usize; N]) -> bool {
        coord.iter().zip(self.dims.iter()).all(|(c, d)| c < d)
    }

    /// Flat index of `coord`. Coordinates must be in range.
    pub fn flatten(&self, coord: [usize; N]) -> usize {
        debug_assert!(self.contains(coord), "{:?} outside {:?}", coord, self.dims);
        let mut index = 0;
        for axis in (0..N).rev() {
            index = index * self.dims[axis] + coord[axis];
        }
        index
    }

    pub fn unflatten(&self, mut index: usize) -> [usize; N] {
        debug_assert!(index < self.cells.len());
        let mut coord = [0; N];
        for axis in 0..N {
            coord[axis] = index % self.dims[axis];
            index /= self.dims[axis];
        }
        coord
    }

    pub fn get(&self, coord: [usize; N]) -> Option<&T> {
        if self.contains(coord) {
            Some(&self.cells[self.flatten(coord)])
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, coord: [usize; N]) -> Option<&mut T> {
        if self.contains(coord) {
            let index = self.flatten(coord);
            Some(&mut self.cells[index])
        } else {
            None
        }
    }

    pub fn as_slice(&self) -> &[T] {
        &self.cells
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.cells
    }

    /// Cells with their coordinates, in flat order
    pub fn iter_coords(&self) -> impl Iterator<Item = ([usize; N], &T)> + '_ {
        self.cells
            .iter()
            .enumerate()
            .map(move |(index, cell)| (self.unflatten(index), cell))
    }
}

impl<T, const N: usize> Index<[usize; N]> for Grid<T, N> {
    type Output = T;

    fn index(&self, coord: [usize; N]) -> &T {
        &self.cells[self.flatten(coord)]
    }
}

impl<T, const N: usize> IndexMut<[usize; N]> for Grid<T, N> {
    fn index_mut(&mut self, coord: [usize; N]) -> &mut T {
        let index = self.flatten(coord);
        &mut self.cells[index]
    }
}
