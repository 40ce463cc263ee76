//! Synthetic field generators.
//!
//! Fields are laid out like Met Office extracts: optional `realization` and
//! `height` axes followed by projected y and x axes on a regular spacing.

use nwp_common::grid::{HEIGHT_DIM, REALIZATION_DIM, X_DIM, Y_DIM};
use nwp_common::{Dimension, GridField};

/// Creates a test grid with predictable values.
///
/// Each cell value is `col * 1000 + row`, so grid[row][col] can be checked
/// directly after a round trip.
///
/// # Example
///
/// ```
/// use test_utils::create_test_grid;
///
/// let grid = create_test_grid(10, 5);
/// assert_eq!(grid.len(), 50);
/// assert_eq!(grid[1], 1000.0); // col=1, row=0
/// assert_eq!(grid[10], 1.0);   // col=0, row=1
/// ```
pub fn create_test_grid(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            data.push((col * 1000 + row) as f32);
        }
    }
    data
}

/// Evenly spaced coordinates starting at `start`.
pub fn axis(start: f64, spacing: f64, len: usize) -> Vec<f64> {
    (0..len).map(|i| start + spacing * i as f64).collect()
}

/// A single-level projected field whose value at (x, y) is `f(x, y)`.
pub fn projected_field(
    variable: &str,
    xs: Vec<f64>,
    ys: Vec<f64>,
    f: impl Fn(f64, f64) -> f32,
) -> GridField {
    let values = ys
        .iter()
        .flat_map(|y| xs.iter().map(|x| f(*x, *y)).collect::<Vec<_>>())
        .collect();
    GridField::new(
        variable,
        vec![Dimension::with_coords(Y_DIM, ys), Dimension::with_coords(X_DIM, xs)],
        values,
    )
    .expect("generated field has a consistent shape")
}

/// A multi-level ensemble field; values follow [`create_test_grid`] offset by
/// `10_000 * height_index + 100_000 * realization`.
pub fn ensemble_field(
    variable: &str,
    realizations: usize,
    heights: &[f64],
    xs: Vec<f64>,
    ys: Vec<f64>,
) -> GridField {
    let plane = create_test_grid(xs.len(), ys.len());
    let mut values = Vec::with_capacity(realizations * heights.len() * plane.len());
    for r in 0..realizations {
        for h in 0..heights.len() {
            values.extend(plane.iter().map(|v| v + (10_000 * h + 100_000 * r) as f32));
        }
    }
    GridField::new(
        variable,
        vec![
            Dimension::with_coords(REALIZATION_DIM, axis(0.0, 1.0, realizations)),
            Dimension::with_coords(HEIGHT_DIM, heights.to_vec()),
            Dimension::with_coords(Y_DIM, ys),
            Dimension::with_coords(X_DIM, xs),
        ],
        values,
    )
    .expect("generated field has a consistent shape")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_projected_field_layout() {
        let field = projected_field("t", axis(0.0, 10.0, 3), axis(100.0, 10.0, 2), |x, y| (x + y) as f32);
        assert_eq!(field.shape(), vec![2, 3]);
        assert_eq!(field.get(&[1, 2]), Some(130.0));
    }

    #[test]
    fn test_ensemble_field_offsets() {
        let field = ensemble_field("wind_speed", 2, &[10.0, 50.0], axis(0.0, 1.0, 4), axis(0.0, 1.0, 3));
        assert_eq!(field.shape(), vec![2, 2, 3, 4]);
        assert_eq!(field.get(&[1, 1, 2, 3]), Some(110_000.0 + 3002.0));
    }
}
