//! The grid-shaped region code array

use crate::errors::{RegionAggError, Result};
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Region code of every grid cell
///
/// Codes are interned: each cell stores an index into a sorted code table
/// whose entry 0 is always the unassigned sentinel. The map is read-only once
/// built and shared by reference for the whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionMap {
    codes: Vec<String>,
    cells: Array2<u16>,
    stride: usize,
}

impl RegionMap {
    /// Index of the unassigned sentinel in the code table
    pub const UNASSIGNED: u16 = 0;

    /// Intern a grid of region codes
    ///
    /// Cells equal to `unassigned` map to [`RegionMap::UNASSIGNED`]; every other
    /// code gets an index in sorted code order.
    ///
    /// # Errors
    ///
    /// Fails if the grid holds more distinct codes than fit in the index type.
    pub fn from_codes<S: AsRef<str>>(
        codes: ArrayView2<'_, S>,
        unassigned: &str,
        stride: usize,
    ) -> Result<Self> {
        let distinct: BTreeSet<&str> = codes
            .iter()
            .map(AsRef::as_ref)
            .filter(|code| *code != unassigned)
            .collect();
        if distinct.len() >= usize::from(u16::MAX) {
            return Err(RegionAggError::PolygonDataset {
                message: format!(
                    "{} distinct region codes exceed the supported maximum",
                    distinct.len()
                ),
            });
        }

        let mut table = Vec::with_capacity(distinct.len() + 1);
        table.push(unassigned.to_string());
        table.extend(distinct.iter().map(|code| (*code).to_string()));

        let index: HashMap<&str, u16> = distinct
            .iter()
            .enumerate()
            .map(|(i, code)| (*code, (i + 1) as u16))
            .collect();
        let cells = codes.map(|code| {
            let code: &str = code.as_ref();
            index.get(code).copied().unwrap_or(Self::UNASSIGNED)
        });

        Ok(Self {
            codes: table,
            cells,
            stride: stride.max(1),
        })
    }

    /// Shape of the map as `(rows, cols)`
    #[must_use]
    pub fn dim(&self) -> (usize, usize) {
        self.cells.dim()
    }

    /// Stride the underlying coordinates were subsampled with
    #[must_use]
    pub const fn stride(&self) -> usize {
        self.stride
    }

    #[must_use]
    pub fn unassigned_code(&self) -> &str {
        &self.codes[usize::from(Self::UNASSIGNED)]
    }

    /// The code table; entry 0 is the unassigned sentinel
    #[must_use]
    pub fn codes(&self) -> &[String] {
        &self.codes
    }

    /// Region codes actually present on land cells, sorted
    #[must_use]
    pub fn regions(&self) -> &[String] {
        &self.codes[1..]
    }

    /// Code table indices per cell
    #[must_use]
    pub fn indices(&self) -> ArrayView2<'_, u16> {
        self.cells.view()
    }

    #[must_use]
    pub fn code(&self, index: u16) -> &str {
        &self.codes[usize::from(index)]
    }

    /// Region code of the cell at `(row, col)`, or `None` when out of bounds
    #[must_use]
    pub fn code_at(&self, row: usize, col: usize) -> Option<&str> {
        self.cells.get((row, col)).map(|&i| self.code(i))
    }

    /// `true` for every cell assigned to a region
    #[must_use]
    pub fn land_mask(&self) -> Array2<bool> {
        self.cells.mapv(|i| i != Self::UNASSIGNED)
    }

    /// Number of land cells
    #[must_use]
    pub fn land_cells(&self) -> usize {
        self.cells.iter().filter(|&&i| i != Self::UNASSIGNED).count()
    }

    /// Expand back into a grid of code strings
    #[must_use]
    pub fn to_code_array(&self) -> Array2<String> {
        self.cells.mapv(|i| self.code(i).to_string())
    }

    pub(crate) fn to_snapshot(&self) -> Snapshot {
        let (rows, cols) = self.dim();
        Snapshot {
            rows,
            cols,
            stride: self.stride,
            codes: self.codes.clone(),
            cells: self.cells.iter().copied().collect(),
        }
    }

    pub(crate) fn from_snapshot(snapshot: Snapshot) -> Result<Self> {
        if snapshot.codes.is_empty() {
            return Err(RegionAggError::PolygonDataset {
                message: "region map snapshot has an empty code table".into(),
            });
        }
        if let Some(&bad) = snapshot
            .cells
            .iter()
            .find(|&&i| usize::from(i) >= snapshot.codes.len())
        {
            return Err(RegionAggError::PolygonDataset {
                message: format!("region map snapshot references unknown code index {bad}"),
            });
        }
        let cells = Array2::from_shape_vec((snapshot.rows, snapshot.cols), snapshot.cells)?;
        Ok(Self {
            codes: snapshot.codes,
            cells,
            stride: snapshot.stride.max(1),
        })
    }
}

/// On-disk form of a [`RegionMap`]
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Snapshot {
    pub rows: usize,
    pub cols: usize,
    pub stride: usize,
    pub codes: Vec<String>,
    pub cells: Vec<u16>,
}
