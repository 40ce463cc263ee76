//! Tests for BoundingBox and GridField operations used by the subsetter.

use nwp_common::grid::{HEIGHT_DIM, X_DIM, Y_DIM};
use nwp_common::{BoundingBox, Dimension, GridField};

// ============================================================================
// BoundingBox
// ============================================================================

#[test]
fn test_bbox_new() {
    let bbox = BoundingBox::new(-611744.98, -742783.94, 494613.07, 668920.21);
    assert_eq!(bbox.min_x, -611744.98);
    assert_eq!(bbox.max_y, 668920.21);
}

#[test]
fn test_bbox_dimensions() {
    let bbox = BoundingBox::new(-100.0, -50.0, 100.0, 50.0);
    assert_eq!(bbox.width(), 200.0);
    assert_eq!(bbox.height(), 100.0);
}

#[test]
fn test_bbox_contains_edges() {
    let bbox = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
    assert!(bbox.contains_point(0.0, 0.0));
    assert!(bbox.contains_point(10.0, 10.0));
    assert!(bbox.contains_point(5.0, 5.0));
    assert!(!bbox.contains_point(10.0001, 5.0));
    assert!(!bbox.contains_point(5.0, -0.0001));
}

#[test]
fn test_bbox_degenerate_is_valid() {
    let bbox = BoundingBox::from_bounds(5.0, 5.0, 3.0, 3.0).unwrap();
    assert!(bbox.contains_point(3.0, 5.0));
    assert_eq!(bbox.width(), 0.0);
}

#[test]
fn test_bbox_serde_fields() {
    let bbox = BoundingBox::new(1.0, 2.0, 3.0, 4.0);
    let json = serde_json::to_value(bbox).unwrap();
    assert_eq!(json["min_x"], 1.0);
    assert_eq!(json["max_y"], 4.0);
}

// ============================================================================
// GridField
// ============================================================================

fn height_field() -> GridField {
    // height(3) x y(2) x x(2)
    GridField::new(
        "wind_speed",
        vec![
            Dimension::with_coords(HEIGHT_DIM, vec![10.0, 50.0, 100.0]),
            Dimension::with_coords(Y_DIM, vec![0.0, 2000.0]),
            Dimension::with_coords(X_DIM, vec![0.0, 2000.0]),
        ],
        (0..12).map(|v| v as f32).collect(),
    )
    .unwrap()
}

#[test]
fn test_shape_and_strides() {
    let field = height_field();
    assert_eq!(field.shape(), vec![3, 2, 2]);
    assert_eq!(field.strides(), vec![4, 2, 1]);
    assert_eq!(field.get(&[2, 1, 0]), Some(10.0));
    assert_eq!(field.get(&[3, 0, 0]), None);
}

#[test]
fn test_select_reorders_heights() {
    let field = height_field();
    let picked = field
        .select(&[vec![2, 0], vec![0, 1], vec![0, 1]])
        .unwrap();

    assert_eq!(picked.shape(), vec![2, 2, 2]);
    assert_eq!(
        picked.dim(HEIGHT_DIM).unwrap().coords,
        Some(vec![100.0, 10.0])
    );
    assert_eq!(picked.values, vec![8.0, 9.0, 10.0, 11.0, 0.0, 1.0, 2.0, 3.0]);
}

#[test]
fn test_select_out_of_range() {
    let field = height_field();
    assert!(field.select(&[vec![3], vec![0], vec![0]]).is_err());
    assert!(field.select(&[vec![0], vec![0]]).is_err());
}

#[test]
fn test_select_keeps_metadata() {
    let field = height_field().with_units("m s-1");
    let picked = field.select(&[vec![0], vec![1], vec![1]]).unwrap();
    assert_eq!(picked.units.as_deref(), Some("m s-1"));
    assert_eq!(picked.variable_name, "wind_speed");
    assert_eq!(picked.values, vec![3.0]);
}
