//! PV yield forecasts driven by surface irradiance.
//!
//! A linear model per PV system (`slope * irradiance + intercept`) is
//! applied to the irradiance interpolated at each system's location. The
//! result is written as a GeoJSON FeatureCollection whenever a new
//! `surface_downwelling_shortwave_flux_in_air` dataset is published.

pub mod error;
pub mod hook;
pub mod model;
pub mod predict;

pub use error::{ForecastError, ForecastResult};
pub use hook::PvForecastHook;
pub use model::{PvModel, PvSystem};
pub use predict::{predict, predict_as_geojson, Prediction, IRRADIANCE_VARIABLE};
