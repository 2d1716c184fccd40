use std::collections::VecDeque;

use serde::Deserialize;
use thiserror::Error;

use crate::geometry::Coord;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    #[error("grid row count mismatch: expected {expected}, got {actual}")]
    RowCountMismatch { expected: usize, actual: usize },
    #[error("grid row {row} width mismatch: expected {expected}, got {actual}")]
    RowWidthMismatch {
        row: usize,
        expected: usize,
        actual: usize,
    },
    #[error("coordinate {coord} is outside a {dim}x{dim} grid")]
    OutOfBounds { coord: Coord, dim: usize },
    #[error("failed to decode encoded grid: {0}")]
    Encoded(String),
}

/// Dense square grid indexed by [`Coord`].
#[derive(Debug, Clone, PartialEq)]
pub struct Grid<T> {
    dim: usize,
    cells: Vec<T>,
}

impl<T: Clone> Grid<T> {
    pub fn filled(dim: usize, value: T) -> Self {
        Self {
            dim,
            cells: vec![value; dim * dim],
        }
    }
}

impl<T> Grid<T> {
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn get(&self, coord: Coord) -> Option<&T> {
        self.index_of(coord).map(|index| &self.cells[index])
    }

    pub fn get_mut(&mut self, coord: Coord) -> Option<&mut T> {
        self.index_of(coord).map(|index| &mut self.cells[index])
    }

    pub fn set(&mut self, coord: Coord, value: T) -> Result<(), GridError> {
        let dim = self.dim;
        let slot = self
            .get_mut(coord)
            .ok_or(GridError::OutOfBounds { coord, dim })?;
        *slot = value;
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (Coord, &T)> + '_ {
        let dim = self.dim;
        self.cells.iter().enumerate().map(move |(index, value)| {
            let coord = Coord::new((index / dim) as i32, (index % dim) as i32);
            (coord, value)
        })
    }

    fn index_of(&self, coord: Coord) -> Option<usize> {
        if !coord.in_bounds(self.dim) {
            return None;
        }
        Some(coord.r as usize * self.dim + coord.c as usize)
    }
}

/// Wire form of the occupancy map: rows of occupant names, or the same rows
/// JSON-encoded into a string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum OccupancyTransport {
    Rows(Vec<Vec<Option<String>>>),
    Encoded(String),
}

/// Spatial index from cell to occupant name.
#[derive(Debug, Clone, PartialEq)]
pub struct OccupancyMap {
    cells: Grid<Option<String>>,
}

impl OccupancyMap {
    pub fn empty(dim: usize) -> Self {
        Self {
            cells: Grid::filled(dim, None),
        }
    }

    pub fn deserialize(raw: &OccupancyTransport, dim: usize) -> Result<Self, GridError> {
        match raw {
            OccupancyTransport::Rows(rows) => Self::from_rows(rows, dim),
            OccupancyTransport::Encoded(text) => {
                let rows: Vec<Vec<Option<String>>> = serde_json::from_str(text)
                    .map_err(|error| GridError::Encoded(error.to_string()))?;
                Self::from_rows(&rows, dim)
            }
        }
    }

    fn from_rows(rows: &[Vec<Option<String>>], dim: usize) -> Result<Self, GridError> {
        if rows.len() != dim {
            return Err(GridError::RowCountMismatch {
                expected: dim,
                actual: rows.len(),
            });
        }
        let mut cells = Vec::with_capacity(dim * dim);
        for (row_index, row) in rows.iter().enumerate() {
            if row.len() != dim {
                return Err(GridError::RowWidthMismatch {
                    row: row_index,
                    expected: dim,
                    actual: row.len(),
                });
            }
            cells.extend(row.iter().cloned());
        }
        Ok(Self {
            cells: Grid { dim, cells },
        })
    }

    pub fn dim(&self) -> usize {
        self.cells.dim()
    }

    pub fn occupant(&self, coord: Coord) -> Option<&str> {
        self.cells.get(coord).and_then(|slot| slot.as_deref())
    }

    pub fn is_occupied(&self, coord: Coord) -> bool {
        self.occupant(coord).is_some()
    }

    pub fn place(&mut self, coord: Coord, name: &str) -> Result<(), GridError> {
        self.cells.set(coord, Some(name.to_string()))
    }

    pub fn clear(&mut self, coord: Coord) -> Result<(), GridError> {
        self.cells.set(coord, None)
    }

    pub fn occupied_cells(&self) -> impl Iterator<Item = (Coord, &str)> + '_ {
        self.cells
            .iter()
            .filter_map(|(coord, slot)| slot.as_deref().map(|name| (coord, name)))
    }

    /// Breadth-first step counts from `source` across empty cells.
    ///
    /// Occupied cells other than the source are impassable and unreached
    /// cells stay `None`. An out-of-bounds source yields an all-`None` grid.
    pub fn distances_from(&self, source: Coord) -> Grid<Option<u32>> {
        let mut distances = Grid::filled(self.dim(), None);
        if distances.set(source, Some(0)).is_err() {
            return distances;
        }

        let mut frontier = VecDeque::from([source]);
        while let Some(current) = frontier.pop_front() {
            let Some(&Some(step)) = distances.get(current) else {
                continue;
            };
            for next in current.neighbors() {
                if !next.in_bounds(self.dim()) || self.is_occupied(next) {
                    continue;
                }
                if let Some(slot) = distances.get_mut(next) {
                    if slot.is_none() {
                        *slot = Some(step + 1);
                        frontier.push_back(next);
                    }
                }
            }
        }
        distances
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(layout: &[&[Option<&str>]]) -> OccupancyTransport {
        OccupancyTransport::Rows(
            layout
                .iter()
                .map(|row| row.iter().map(|cell| cell.map(str::to_string)).collect())
                .collect(),
        )
    }

    #[test]
    fn deserialize_reads_rows_and_encoded_rows() {
        let transport = rows(&[&[None, Some("A")], &[None, None]]);
        let map = OccupancyMap::deserialize(&transport, 2).expect("rows");
        assert_eq!(map.occupant(Coord::new(0, 1)), Some("A"));
        assert_eq!(map.occupant(Coord::new(1, 1)), None);

        let encoded = OccupancyTransport::Encoded("[[null,null],[\"B\",null]]".to_string());
        let map = OccupancyMap::deserialize(&encoded, 2).expect("encoded");
        assert_eq!(map.occupant(Coord::new(1, 0)), Some("B"));
    }

    #[test]
    fn deserialize_rejects_shape_mismatch() {
        let short = rows(&[&[None, None]]);
        assert_eq!(
            OccupancyMap::deserialize(&short, 2),
            Err(GridError::RowCountMismatch {
                expected: 2,
                actual: 1
            })
        );

        let ragged = rows(&[&[None, None], &[None]]);
        assert_eq!(
            OccupancyMap::deserialize(&ragged, 2),
            Err(GridError::RowWidthMismatch {
                row: 1,
                expected: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn set_outside_grid_is_an_error() {
        let mut map = OccupancyMap::empty(3);
        assert_eq!(
            map.place(Coord::new(3, 0), "A"),
            Err(GridError::OutOfBounds {
                coord: Coord::new(3, 0),
                dim: 3
            })
        );
        assert!(map.occupant(Coord::new(-1, 0)).is_none());
    }

    #[test]
    fn distances_route_around_occupied_cells() {
        // . A .
        // . B .
        // . . .
        let mut map = OccupancyMap::empty(3);
        map.place(Coord::new(0, 1), "A").expect("place A");
        map.place(Coord::new(1, 1), "B").expect("place B");

        let distances = map.distances_from(Coord::new(0, 1));
        assert_eq!(distances.get(Coord::new(0, 1)), Some(&Some(0)));
        assert_eq!(distances.get(Coord::new(0, 0)), Some(&Some(1)));
        assert_eq!(distances.get(Coord::new(0, 2)), Some(&Some(1)));
        assert_eq!(distances.get(Coord::new(1, 1)), Some(&None));
        assert_eq!(distances.get(Coord::new(2, 1)), Some(&Some(4)));
    }

    #[test]
    fn walled_off_cells_stay_unreached() {
        let mut map = OccupancyMap::empty(3);
        map.place(Coord::new(1, 0), "W1").expect("place");
        map.place(Coord::new(0, 1), "W2").expect("place");

        let distances = map.distances_from(Coord::new(0, 0));
        let reached = distances.iter().filter(|(_, d)| d.is_some()).count();
        assert_eq!(reached, 1);
    }

    #[test]
    fn occupied_cells_lists_every_occupant() {
        let transport = rows(&[&[Some("A"), None], &[None, Some("B")]]);
        let map = OccupancyMap::deserialize(&transport, 2).expect("rows");
        let occupied = map.occupied_cells().collect::<Vec<_>>();
        assert_eq!(
            occupied,
            vec![(Coord::new(0, 0), "A"), (Coord::new(1, 1), "B")]
        );
    }
}
