//! In-memory representation of a decoded gridded field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{NwpError, NwpResult};

/// Dimension name used for projected x coordinates.
pub const X_DIM: &str = "projection_x_coordinate";
/// Dimension name used for projected y coordinates.
pub const Y_DIM: &str = "projection_y_coordinate";
/// Dimension name used for heights above ground.
pub const HEIGHT_DIM: &str = "height";
/// Dimension name used for ensemble members.
pub const REALIZATION_DIM: &str = "realization";

/// A named dimension of a gridded variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    pub len: usize,
    /// Coordinate values along this dimension, when the source provides them.
    pub coords: Option<Vec<f64>>,
}

impl Dimension {
    pub fn new(name: impl Into<String>, len: usize) -> Self {
        Self {
            name: name.into(),
            len,
            coords: None,
        }
    }

    pub fn with_coords(name: impl Into<String>, coords: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            len: coords.len(),
            coords: Some(coords),
        }
    }
}

/// One data variable with its dimensions, stored row-major (last dimension
/// varies fastest).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridField {
    pub variable_name: String,
    pub units: Option<String>,
    pub dims: Vec<Dimension>,
    pub values: Vec<f32>,
    pub attributes: BTreeMap<String, serde_json::Value>,
    pub forecast_reference_time: Option<DateTime<Utc>>,
    pub valid_time: Option<DateTime<Utc>>,
}

impl GridField {
    /// Create a field, checking that the value count matches the dimensions.
    pub fn new(
        variable_name: impl Into<String>,
        dims: Vec<Dimension>,
        values: Vec<f32>,
    ) -> NwpResult<Self> {
        let variable_name = variable_name.into();
        for dim in &dims {
            if let Some(coords) = &dim.coords {
                if coords.len() != dim.len {
                    return Err(NwpError::InvalidGrid(format!(
                        "{}: dimension '{}' has {} coordinates for length {}",
                        variable_name,
                        dim.name,
                        coords.len(),
                        dim.len
                    )));
                }
            }
        }
        let expected: usize = dims.iter().map(|d| d.len).product();
        if expected != values.len() {
            return Err(NwpError::InvalidGrid(format!(
                "{}: expected {} values for shape {:?}, got {}",
                variable_name,
                expected,
                dims.iter().map(|d| d.len).collect::<Vec<_>>(),
                values.len()
            )));
        }

        Ok(Self {
            variable_name,
            units: None,
            dims,
            values,
            attributes: BTreeMap::new(),
            forecast_reference_time: None,
            valid_time: None,
        })
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }

    pub fn with_times(mut self, forecast_reference_time: DateTime<Utc>, valid_time: DateTime<Utc>) -> Self {
        self.forecast_reference_time = Some(forecast_reference_time);
        self.valid_time = Some(valid_time);
        self
    }

    /// Shape of the field, one entry per dimension.
    pub fn shape(&self) -> Vec<usize> {
        self.dims.iter().map(|d| d.len).collect()
    }

    /// Position of a dimension by name.
    pub fn dim_index(&self, name: &str) -> Option<usize> {
        self.dims.iter().position(|d| d.name == name)
    }

    pub fn dim(&self, name: &str) -> Option<&Dimension> {
        self.dims.iter().find(|d| d.name == name)
    }

    /// Row-major strides for each dimension.
    pub fn strides(&self) -> Vec<usize> {
        let mut strides = vec![1; self.dims.len()];
        for i in (0..self.dims.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * self.dims[i + 1].len;
        }
        strides
    }

    /// Value at a multi-dimensional index, if in bounds.
    pub fn get(&self, index: &[usize]) -> Option<f32> {
        if index.len() != self.dims.len() {
            return None;
        }
        let mut offset = 0;
        for ((i, stride), dim) in index.iter().zip(self.strides()).zip(&self.dims) {
            if *i >= dim.len {
                return None;
            }
            offset += i * stride;
        }
        self.values.get(offset).copied()
    }

    /// Build a new field keeping only the given indices along each dimension.
    ///
    /// `selection` must have one entry per dimension; coordinates are carried
    /// over for the selected positions.
    pub fn select(&self, selection: &[Vec<usize>]) -> NwpResult<Self> {
        if selection.len() != self.dims.len() {
            return Err(NwpError::InvalidGrid(format!(
                "selection has {} axes, field has {}",
                selection.len(),
                self.dims.len()
            )));
        }
        for (picked, dim) in selection.iter().zip(&self.dims) {
            if let Some(bad) = picked.iter().find(|i| **i >= dim.len) {
                return Err(NwpError::InvalidGrid(format!(
                    "index {} out of range for dimension '{}' (len {})",
                    bad, dim.name, dim.len
                )));
            }
        }

        let dims: Vec<Dimension> = selection
            .iter()
            .zip(&self.dims)
            .map(|(picked, dim)| Dimension {
                name: dim.name.clone(),
                len: picked.len(),
                coords: dim
                    .coords
                    .as_ref()
                    .map(|c| picked.iter().map(|i| c[*i]).collect()),
            })
            .collect();

        let total: usize = dims.iter().map(|d| d.len).product();
        let strides = self.strides();
        let mut values = Vec::with_capacity(total);
        let mut cursor = vec![0usize; selection.len()];

        if total > 0 {
            'outer: loop {
                let offset: usize = cursor
                    .iter()
                    .enumerate()
                    .map(|(axis, pos)| selection[axis][*pos] * strides[axis])
                    .sum();
                values.push(self.values[offset]);

                // Odometer increment, last axis fastest.
                let mut axis = cursor.len();
                loop {
                    if axis == 0 {
                        break 'outer;
                    }
                    axis -= 1;
                    cursor[axis] += 1;
                    if cursor[axis] < selection[axis].len() {
                        break;
                    }
                    cursor[axis] = 0;
                }
            }
        }

        Ok(Self {
            variable_name: self.variable_name.clone(),
            units: self.units.clone(),
            dims,
            values,
            attributes: self.attributes.clone(),
            forecast_reference_time: self.forecast_reference_time,
            valid_time: self.valid_time,
        })
    }

    /// Whether any dimension has zero length.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
