//! NetCDF decoding for NWP field extracts.
//!
//! Each Met Office extract carries exactly one data variable (for example
//! `wind_speed` or `air_temperature`) laid out over some of `realization`,
//! `height`, `projection_y_coordinate` and `projection_x_coordinate`, plus
//! scalar coordinate variables such as `time` and `forecast_reference_time`
//! and cell bounds such as `projection_y_coordinate_bnds`.
//!
//! [`decode_field`] turns the raw bytes of such a file into a
//! [`nwp_common::GridField`]. The heavy lifting is done by the native
//! `netcdf` library (see [`native`]); CF time handling lives in [`time`] so
//! that it can be tested without the C libraries.

pub mod error;
pub mod native;
pub mod time;

pub use error::{NetCdfError, NetCdfResult};
pub use native::{decode_field, silence_hdf5_errors};
pub use time::parse_cf_time;
