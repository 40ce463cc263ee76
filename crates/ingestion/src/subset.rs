//! Vertical and geographic subsetting of decoded fields.

use serde::{Deserialize, Serialize};

use nwp_common::grid::{HEIGHT_DIM, X_DIM, Y_DIM};
use nwp_common::{BoundingBox, GridField};

use crate::error::{IngestionError, Result};

/// What to keep from each field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubsetSpec {
    /// Heights (m) to keep on fields that have a height dimension
    #[serde(default)]
    pub height_meters: Option<Vec<f64>>,
    /// Projected bounds to keep, inclusive
    #[serde(default)]
    pub bbox: Option<BoundingBox>,
}

impl SubsetSpec {
    pub fn new(height_meters: Option<Vec<f64>>, bbox: Option<BoundingBox>) -> Self {
        Self {
            height_meters,
            bbox,
        }
    }

    /// Keep everything.
    pub fn none() -> Self {
        Self::default()
    }
}

/// Apply a subset to a field.
///
/// Height selection follows the order of `height_meters` and fails if a
/// requested height is missing. Fields without a height dimension pass
/// through unchanged on that axis. The bounding box keeps x/y coordinates
/// within the inclusive bounds, in their original order.
pub fn apply(field: &GridField, spec: &SubsetSpec) -> Result<GridField> {
    let mut selection: Vec<Vec<usize>> = field.dims.iter().map(|d| (0..d.len).collect()).collect();

    if let (Some(heights), Some(axis)) = (&spec.height_meters, field.dim_index(HEIGHT_DIM)) {
        let coords = coords_of(field, axis)?;
        let mut picked = Vec::with_capacity(heights.len());
        for height in heights {
            let index = coords.iter().position(|c| c == height).ok_or_else(|| {
                IngestionError::Subset(format!(
                    "{}: height {} not in {:?}",
                    field.variable_name, height, coords
                ))
            })?;
            picked.push(index);
        }
        selection[axis] = picked;
    }

    if let Some(bbox) = &spec.bbox {
        if let Some(axis) = field.dim_index(X_DIM) {
            selection[axis] = within(coords_of(field, axis)?, |x| bbox.contains_x(x));
        }
        if let Some(axis) = field.dim_index(Y_DIM) {
            selection[axis] = within(coords_of(field, axis)?, |y| bbox.contains_y(y));
        }
    }

    let subset = field
        .select(&selection)
        .map_err(|e| IngestionError::Subset(e.to_string()))?;

    if subset.is_empty() {
        return Err(IngestionError::Subset(format!(
            "{}: subset is empty (shape {:?})",
            field.variable_name,
            subset.shape()
        )));
    }

    Ok(subset)
}

fn coords_of(field: &GridField, axis: usize) -> Result<&[f64]> {
    let dim = &field.dims[axis];
    dim.coords.as_deref().ok_or_else(|| {
        IngestionError::Subset(format!(
            "{}: dimension '{}' has no coordinate values",
            field.variable_name, dim.name
        ))
    })
}

fn within(coords: &[f64], keep: impl Fn(f64) -> bool) -> Vec<usize> {
    coords
        .iter()
        .enumerate()
        .filter(|(_, c)| keep(**c))
        .map(|(i, _)| i)
        .collect()
}
