//! Masked per-region reduction of raster values

use super::records::{AggregateRecord, CellRecord};
use crate::derive::VariableSet;
use crate::errors::{RegionAggError, Result};
use crate::message::{Grid, RasterMessage};
use crate::region::RegionMap;
use ndarray::{s, ArrayView2, Zip};

/// Reduces rasters to per-region means against a shared [`RegionMap`]
///
/// Raster values are subsampled by the map's stride before they are combined
/// with it, so a map built on downsampled coordinates lines up with
/// full-resolution messages.
pub struct RegionAggregator<'a> {
    map: &'a RegionMap,
    coords: Option<&'a Grid>,
}

impl<'a> RegionAggregator<'a> {
    pub fn new(map: &'a RegionMap) -> Self {
        Self { map, coords: None }
    }

    /// Attach the (subsampled) coordinates of the map, needed by [`Self::cells`]
    ///
    /// # Errors
    ///
    /// Fails if the coordinates do not have the map's shape.
    pub fn with_coordinates(mut self, coords: &'a Grid) -> Result<Self> {
        if coords.shape() != self.map.dim() {
            return Err(RegionAggError::ShapeMismatch {
                variable: "coordinates".into(),
                expected: self.map.dim(),
                actual: coords.shape(),
            });
        }
        self.coords = Some(coords);
        Ok(self)
    }

    #[must_use]
    pub const fn map(&self) -> &'a RegionMap {
        self.map
    }

    /// Per-region means of one message
    ///
    /// Returns an empty vector when no land cell is valid.
    ///
    /// # Errors
    ///
    /// Returns [`RegionAggError::ShapeMismatch`] if the subsampled raster does
    /// not have the map's shape.
    pub fn aggregate(&self, message: &RasterMessage) -> Result<Vec<AggregateRecord>> {
        let mask = message.validity_mask();
        let (values, mask) = self.aligned(message, mask.view())?;
        let regions = self.map.indices();

        let mut sums = vec![(0.0_f64, 0_usize); self.map.codes().len()];
        Zip::from(&values)
            .and(&mask)
            .and(&regions)
            .for_each(|&value, &valid, &region| {
                if valid && region != RegionMap::UNASSIGNED {
                    let slot = &mut sums[usize::from(region)];
                    slot.0 += value;
                    slot.1 += 1;
                }
            });

        let records = sums
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.1 > 0)
            .map(|(index, &(sum, count))| AggregateRecord {
                valid_time: message.valid_time,
                forecast_step: message.forecast_step,
                region: self.map.codes()[index].clone(),
                variable: message.variable.clone(),
                value: sum / count as f64,
                cells: count,
            })
            .collect();
        Ok(records)
    }

    /// Per-region means of every variable in a set
    ///
    /// Variables that do not line up with the map are logged and skipped.
    #[must_use]
    pub fn aggregate_set(&self, set: &VariableSet) -> Vec<AggregateRecord> {
        let mut records = Vec::new();
        for message in set.messages() {
            match self.aggregate(message) {
                Ok(mut batch) => records.append(&mut batch),
                Err(e) => log::warn!("Skipping '{}' at {}: {e}", message.variable, set.key),
            }
        }
        records
    }

    /// Every valid land cell of one message with its coordinates
    ///
    /// # Errors
    ///
    /// Fails if no coordinates were attached or the raster does not line up
    /// with the map.
    pub fn cells(&self, message: &RasterMessage) -> Result<Vec<CellRecord>> {
        let coords = self.coords.ok_or_else(|| RegionAggError::GridUnavailable {
            message: "cell output needs the region map coordinates".into(),
        })?;
        let mask = message.validity_mask();
        let (values, mask) = self.aligned(message, mask.view())?;

        let mut cells = Vec::new();
        Zip::from(&values)
            .and(&mask)
            .and(self.map.indices())
            .and(&coords.lats)
            .and(&coords.lons)
            .for_each(|&value, &valid, &region, &lat, &lon| {
                if valid && region != RegionMap::UNASSIGNED {
                    cells.push(CellRecord {
                        valid_time: message.valid_time,
                        region: self.map.code(region).to_string(),
                        variable: message.variable.clone(),
                        lat,
                        lon,
                        value,
                    });
                }
            });
        Ok(cells)
    }

    fn aligned<'m>(
        &self,
        message: &'m RasterMessage,
        mask: ArrayView2<'m, bool>,
    ) -> Result<(ArrayView2<'m, f64>, ArrayView2<'m, bool>)> {
        let step = self.map.stride() as isize;
        let values = message.values.slice(s![..;step, ..;step]);
        let mask = mask.slice_move(s![..;step, ..;step]);
        if values.dim() != self.map.dim() {
            return Err(RegionAggError::ShapeMismatch {
                variable: message.variable.to_string(),
                expected: self.map.dim(),
                actual: values.dim(),
            });
        }
        Ok((values, mask))
    }
}
