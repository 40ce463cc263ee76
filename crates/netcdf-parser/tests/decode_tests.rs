//! Decoding of NetCDF extracts.
//!
//! The real MOGREPS-UK extracts are not checked in; those tests skip unless
//! the files are found under a testdata directory or `TEST_DATA_DIR`. The
//! remaining tests write small extracts with the same layout.

use chrono::{TimeZone, Utc};
use netcdf_parser::{decode_field, NetCdfError};
use nwp_common::grid::{HEIGHT_DIM, X_DIM, Y_DIM};
use std::path::Path;
use test_utils::{require_test_file, temp_output_dir};

const FILL: f32 = -999.0;

/// Writes an extract with a `projection_y_coordinate_bnds` variable defined
/// ahead of the data variable. With `heights` the data variable is
/// `wind_speed(height, y, x)`, otherwise `air_temperature(y, x)`.
fn write_extract(path: &Path, heights: Option<&[f64]>) -> Vec<u8> {
    let ys = [0.0, 2000.0];
    let xs = [0.0, 2000.0, 4000.0];

    let mut file = netcdf::create(path).unwrap();
    file.add_dimension(Y_DIM, ys.len()).unwrap();
    file.add_dimension(X_DIM, xs.len()).unwrap();
    file.add_dimension("bnds", 2).unwrap();
    if let Some(heights) = heights {
        file.add_dimension(HEIGHT_DIM, heights.len()).unwrap();
        let mut var = file.add_variable::<f64>(HEIGHT_DIM, &[HEIGHT_DIM]).unwrap();
        var.put_values(heights, ..).unwrap();
    }

    let mut var = file.add_variable::<f64>(Y_DIM, &[Y_DIM]).unwrap();
    var.put_attribute("bounds", "projection_y_coordinate_bnds").unwrap();
    var.put_values(&ys, ..).unwrap();

    let mut var = file.add_variable::<f64>(X_DIM, &[X_DIM]).unwrap();
    var.put_values(&xs, ..).unwrap();

    let mut var = file
        .add_variable::<f64>("projection_y_coordinate_bnds", &[Y_DIM, "bnds"])
        .unwrap();
    var.put_values(&[-1000.0, 1000.0, 1000.0, 3000.0], ..).unwrap();

    let (name, dims, raw): (&str, Vec<&str>, Vec<f32>) = match heights {
        Some(_) => (
            "wind_speed",
            vec![HEIGHT_DIM, Y_DIM, X_DIM],
            vec![0.0, 2.0, 4.0, 6.0, 8.0, FILL, 10.0, 12.0, 14.0, 16.0, 18.0, 20.0],
        ),
        None => (
            "air_temperature",
            vec![Y_DIM, X_DIM],
            vec![0.0, 2.0, 4.0, 6.0, 8.0, FILL],
        ),
    };
    let mut var = file.add_variable::<f32>(name, &dims).unwrap();
    var.set_fill_value(FILL).unwrap();
    var.put_attribute("scale_factor", 0.5f32).unwrap();
    var.put_attribute("add_offset", 10.0f32).unwrap();
    var.put_attribute("units", "m s-1").unwrap();
    var.put_values(&raw, ..).unwrap();

    for (time_name, seconds) in [("forecast_reference_time", 1_735_689_600.0), ("time", 1_735_700_400.0)] {
        let mut var = file.add_variable::<f64>(time_name, &[]).unwrap();
        var.put_attribute("units", "seconds since 1970-01-01 00:00:00").unwrap();
        var.put_values(&[seconds], ..).unwrap();
    }

    file.add_attribute("source", "Met Office Unified Model").unwrap();
    drop(file);

    std::fs::read(path).unwrap()
}

#[test]
fn test_decode_named_variable_past_bounds() {
    let dir = temp_output_dir();
    let data = write_extract(&dir.path().join("single.nc"), None);

    let field = decode_field(&data, Some("air_temperature")).unwrap();

    assert_eq!(field.variable_name, "air_temperature");
    assert_eq!(field.shape(), vec![2, 3]);
}

#[test]
fn test_decode_without_name_skips_bounds() {
    let dir = temp_output_dir();
    let data = write_extract(&dir.path().join("single.nc"), None);

    // The bounds variable has the same rank and is defined first.
    let field = decode_field(&data, None).unwrap();

    assert_eq!(field.variable_name, "air_temperature");
}

#[test]
fn test_decode_missing_variable_fails() {
    let dir = temp_output_dir();
    let data = write_extract(&dir.path().join("single.nc"), None);

    let result = decode_field(&data, Some("wind_speed"));
    assert!(matches!(result, Err(NetCdfError::MissingData(_))));
}

#[test]
fn test_decode_unpacks_height_field() {
    let dir = temp_output_dir();
    let data = write_extract(&dir.path().join("levels.nc"), Some(&[10.0, 100.0]));

    let field = decode_field(&data, Some("wind_speed")).unwrap();

    assert_eq!(field.shape(), vec![2, 2, 3]);
    assert_eq!(field.dim(HEIGHT_DIM).unwrap().coords, Some(vec![10.0, 100.0]));
    assert_eq!(field.dim(Y_DIM).unwrap().coords, Some(vec![0.0, 2000.0]));
    assert_eq!(
        field.dim(X_DIM).unwrap().coords,
        Some(vec![0.0, 2000.0, 4000.0])
    );

    for (i, expected) in [10.0, 11.0, 12.0, 13.0, 14.0].iter().enumerate() {
        assert_eq!(field.values[i], *expected);
    }
    assert!(field.values[5].is_nan());
    assert_eq!(field.values[6], 15.0);
    assert_eq!(field.values[11], 20.0);

    assert_eq!(field.units.as_deref(), Some("m s-1"));
    assert_eq!(
        field.forecast_reference_time,
        Some(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap())
    );
    assert_eq!(
        field.valid_time,
        Some(Utc.with_ymd_and_hms(2025, 1, 1, 3, 0, 0).unwrap())
    );
    assert_eq!(
        field.attributes.get("source").and_then(|v| v.as_str()),
        Some("Met Office Unified Model")
    );
}

#[test]
fn test_decode_single_level_extract() {
    let path = require_test_file!("mogreps_uk_surface_downwelling_shortwave_flux_in_air.nc");
    let data = std::fs::read(&path).unwrap();

    let field = decode_field(&data, Some("surface_downwelling_shortwave_flux_in_air")).unwrap();

    assert_eq!(field.variable_name, "surface_downwelling_shortwave_flux_in_air");
    assert!(field.dim(X_DIM).and_then(|d| d.coords.as_ref()).is_some());
    assert!(field.dim(Y_DIM).and_then(|d| d.coords.as_ref()).is_some());
    assert!(field.dim(HEIGHT_DIM).is_none());
    assert!(field.forecast_reference_time.is_some());
    assert!(field.valid_time >= field.forecast_reference_time);
}

#[test]
fn test_decode_multi_level_extract() {
    let path = require_test_file!("mogreps_uk_wind_speed.nc");
    let data = std::fs::read(&path).unwrap();

    let field = decode_field(&data, None).unwrap();

    assert_eq!(field.variable_name, "wind_speed");
    let heights = field.dim(HEIGHT_DIM).and_then(|d| d.coords.clone()).unwrap();
    for wanted in [10.0, 50.0, 100.0, 150.0] {
        assert!(heights.contains(&wanted), "missing height {}", wanted);
    }
    assert_eq!(field.values.len(), field.shape().iter().product::<usize>());
}

#[test]
fn test_decode_empty_bytes_fails() {
    assert!(decode_field(&[], None).is_err());
}
