//! Native NetCDF parsing using the netcdf library.
//!
//! The netcdf library requires a file path (it wraps libnetcdf/HDF5 which need
//! file handles). When reading from bytes, we write to a temp file first.
//!
//! On Linux, we use `/dev/shm` (memory-backed tmpfs) to minimize I/O latency.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Once;

use chrono::{DateTime, Utc};
use netcdf::AttributeValue;
use nwp_common::{Dimension, GridField};
use tracing::debug;

use crate::error::{NetCdfError, NetCdfResult};
use crate::time::parse_cf_time;

/// Silence HDF5's automatic error printing to stderr.
///
/// The HDF5 C library prints verbose error messages to stderr even when errors
/// are handled gracefully by the Rust code (e.g., when checking for optional
/// attributes that don't exist).
///
/// Call this early in `main()`, before any HDF5/NetCDF operations occur.
pub fn silence_hdf5_errors() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        // SAFETY: H5Eset_auto2 is thread-safe and we're passing null pointers
        // to disable error output, which is a documented valid use.
        unsafe {
            hdf5_metno_sys::h5e::H5Eset_auto2(
                hdf5_metno_sys::h5e::H5E_DEFAULT,
                None,
                std::ptr::null_mut(),
            );
        }
    });
}

/// Decode the data variable of a NetCDF file held in memory.
///
/// With `variable` given, that variable is decoded and its absence is an
/// error. Without it, the data variable is the non-coordinate, non-bounds
/// variable with the most dimensions (first one wins on ties). Coordinate
/// variables are attached to their dimensions, `_FillValue` becomes NaN and
/// `scale_factor`/`add_offset` are applied. Scalar `forecast_reference_time`
/// and `time` variables, when present, populate the field's timestamps.
pub fn decode_field(data: &[u8], variable: Option<&str>) -> NetCdfResult<GridField> {
    silence_hdf5_errors();

    let temp_file = TempNetCdf::write(data)?;
    decode_path(temp_file.path(), variable)
}

fn decode_path(path: &Path, variable: Option<&str>) -> NetCdfResult<GridField> {
    let nc_file = netcdf::open(path)
        .map_err(|e| NetCdfError::InvalidFormat(format!("Failed to open NetCDF: {}", e)))?;

    let data_var = match variable {
        Some(name) => nc_file
            .variable(name)
            .filter(|v| !v.dimensions().is_empty())
            .ok_or_else(|| NetCdfError::MissingData(format!("data variable '{}'", name)))?,
        None => find_data_variable(&nc_file)?,
    };

    let variable_name = data_var.name();

    let mut dims = Vec::with_capacity(data_var.dimensions().len());
    for dim in data_var.dimensions() {
        let name = dim.name();
        let coords = match nc_file.variable(&name) {
            Some(coord_var) if is_coordinate_variable(&coord_var) => {
                let values: Vec<f64> = coord_var.get_values(..).map_err(|e| {
                    NetCdfError::InvalidFormat(format!("Failed to read coordinate {}: {}", name, e))
                })?;
                Some(values)
            }
            _ => None,
        };
        dims.push(match coords {
            Some(values) => Dimension::with_coords(name, values),
            None => Dimension::new(name, dim.len()),
        });
    }

    let raw: Vec<f32> = data_var.get_values(..).map_err(|e| {
        NetCdfError::InvalidFormat(format!("Failed to read {}: {}", variable_name, e))
    })?;

    let scale_factor = get_f32_attr(&data_var, "scale_factor").unwrap_or(1.0);
    let add_offset = get_f32_attr(&data_var, "add_offset").unwrap_or(0.0);
    let fill_value = get_f32_attr(&data_var, "_FillValue");

    let values: Vec<f32> = raw
        .into_iter()
        .map(|val| match fill_value {
            Some(fill) if val == fill => f32::NAN,
            _ => val * scale_factor + add_offset,
        })
        .collect();

    let mut field = GridField::new(variable_name.clone(), dims, values)?;
    field.units = get_string_attr(&data_var, "units");
    field.forecast_reference_time = read_scalar_time(&nc_file, "forecast_reference_time");
    field.valid_time = read_scalar_time(&nc_file, "time");
    field.attributes = global_attributes(&nc_file);

    debug!(
        variable = %variable_name,
        shape = ?field.shape(),
        "Decoded NetCDF field"
    );

    Ok(field)
}

// =============================================================================
// Internal helpers
// =============================================================================

/// A temporary copy of the NetCDF bytes, removed on drop.
struct TempNetCdf {
    path: PathBuf,
}

impl TempNetCdf {
    fn write(data: &[u8]) -> NetCdfResult<Self> {
        let path = get_optimal_temp_dir().join(generate_temp_filename());
        let mut file = std::fs::File::create(&path)?;
        file.write_all(data)?;
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempNetCdf {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Get the optimal temp directory for NetCDF file operations.
///
/// On Linux, uses /dev/shm (memory-backed tmpfs) if available.
/// Falls back to the system temp directory otherwise.
fn get_optimal_temp_dir() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        let shm_path = Path::new("/dev/shm");
        if shm_path.exists() && shm_path.is_dir() {
            let test_path = shm_path.join(format!(".netcdf_test_{}", std::process::id()));
            if std::fs::write(&test_path, b"test").is_ok() {
                let _ = std::fs::remove_file(&test_path);
                return shm_path.to_path_buf();
            }
        }
    }

    std::env::temp_dir()
}

/// Generate a unique temp file name for concurrent safety.
fn generate_temp_filename() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let pid = std::process::id();
    let tid = std::thread::current().id();
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);

    format!("nwp_extract_{}_{:?}_{}.nc", pid, tid, count)
}

/// A coordinate variable is one-dimensional and named after its dimension.
fn is_coordinate_variable(var: &netcdf::Variable) -> bool {
    let dims = var.dimensions();
    dims.len() == 1 && dims[0].name() == var.name()
}

/// Highest-rank variable that is neither a coordinate nor a cell-bounds
/// variable.
fn find_data_variable(file: &netcdf::File) -> NetCdfResult<netcdf::Variable<'_>> {
    let bounds: Vec<String> = file
        .variables()
        .filter_map(|v| get_string_attr(&v, "bounds"))
        .collect();

    file.variables()
        .filter(|v| !is_coordinate_variable(v))
        .filter(|v| {
            let name = v.name();
            !name.ends_with("_bnds") && !bounds.contains(&name)
        })
        .fold(None::<netcdf::Variable>, |best, v| match best {
            Some(b) if b.dimensions().len() >= v.dimensions().len() => Some(b),
            _ => Some(v),
        })
        .filter(|v| !v.dimensions().is_empty())
        .ok_or_else(|| NetCdfError::MissingData("gridded data variable".to_string()))
}

fn read_scalar_time(file: &netcdf::File, name: &str) -> Option<DateTime<Utc>> {
    let var = file.variable(name)?;
    if !var.dimensions().is_empty() {
        return None;
    }
    let units = get_string_attr(&var, "units")?;
    let values: Vec<f64> = var.get_values(..).ok()?;
    parse_cf_time(*values.first()?, &units)
}

fn global_attributes(file: &netcdf::File) -> BTreeMap<String, serde_json::Value> {
    let mut attributes = BTreeMap::new();
    for attr in file.attributes() {
        let value = match attr.value() {
            Ok(AttributeValue::Str(s)) => serde_json::Value::from(s),
            Ok(other) => match f64::try_from(other) {
                Ok(v) => serde_json::Value::from(v),
                Err(_) => continue,
            },
            Err(_) => continue,
        };
        attributes.insert(attr.name().to_string(), value);
    }
    attributes
}

/// Check if a variable has an attribute with the given name.
/// This avoids HDF5 error spam when checking for optional attributes.
fn has_attr(var: &netcdf::Variable, name: &str) -> bool {
    var.attributes().any(|attr| attr.name() == name)
}

fn get_f32_attr(var: &netcdf::Variable, name: &str) -> Option<f32> {
    if !has_attr(var, name) {
        return None;
    }
    let attr_value = var.attribute_value(name)?.ok()?;
    f32::try_from(attr_value).ok()
}

fn get_string_attr(var: &netcdf::Variable, name: &str) -> Option<String> {
    if !has_attr(var, name) {
        return None;
    }
    match var.attribute_value(name)?.ok()? {
        AttributeValue::Str(s) => Some(s),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optimal_temp_dir() {
        let dir = get_optimal_temp_dir();
        assert!(dir.exists(), "Temp dir should exist");
    }

    #[test]
    fn test_temp_filename_uniqueness() {
        let name1 = generate_temp_filename();
        let name2 = generate_temp_filename();
        assert_ne!(name1, name2, "Temp filenames should be unique");
    }

    #[test]
    fn test_temp_file_removed_on_drop() {
        let temp = TempNetCdf::write(b"not really netcdf").unwrap();
        let path = temp.path().to_path_buf();
        assert!(path.exists());
        drop(temp);
        assert!(!path.exists());
    }

    #[test]
    fn test_garbage_bytes_rejected() {
        let result = decode_field(b"definitely not a netcdf file", None);
        assert!(matches!(result, Err(NetCdfError::InvalidFormat(_))));
    }
}
