//! Irradiance interpolation and yield prediction.

use chrono::{DateTime, SecondsFormat, Utc};
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, Value};

use nwp_common::grid::{REALIZATION_DIM, X_DIM, Y_DIM};
use nwp_common::GridField;

use crate::error::{ForecastError, ForecastResult};
use crate::model::PvModel;

/// Field the PV models are fitted against.
pub const IRRADIANCE_VARIABLE: &str = "surface_downwelling_shortwave_flux_in_air";

/// Predicted yield of one system.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub system_id: i64,
    pub longitude: f64,
    pub latitude: f64,
    pub forecast_time: Option<DateTime<Utc>>,
    /// NaN when the system lies outside the grid or the irradiance is missing
    pub pv_yield_predicted: f64,
}

/// A 2-D irradiance plane with its coordinates.
struct Plane {
    xs: Vec<f64>,
    ys: Vec<f64>,
    /// Row-major, y outer
    values: Vec<f32>,
}

impl Plane {
    /// Reduce a field to y/x, keeping the first realization. Any other axis
    /// must have length 1.
    fn from_field(field: &GridField) -> ForecastResult<Self> {
        let mut selection = Vec::with_capacity(field.dims.len());
        for dim in &field.dims {
            if dim.name == X_DIM || dim.name == Y_DIM {
                selection.push((0..dim.len).collect());
            } else if dim.name == REALIZATION_DIM || dim.len == 1 {
                selection.push(vec![0]);
            } else {
                return Err(ForecastError::InvalidField(format!(
                    "unexpected dimension '{}' of length {}",
                    dim.name, dim.len
                )));
            }
        }

        let coords = |name: &str| {
            field
                .dim(name)
                .and_then(|d| d.coords.clone())
                .ok_or_else(|| ForecastError::InvalidField(format!("missing coordinate {}", name)))
        };
        let xs = coords(X_DIM)?;
        let ys = coords(Y_DIM)?;

        let y_axis = field.dim_index(Y_DIM).unwrap_or(0);
        let x_axis = field.dim_index(X_DIM).unwrap_or(0);
        if y_axis > x_axis {
            return Err(ForecastError::InvalidField(
                "expected y before x in dimension order".to_string(),
            ));
        }

        let plane = field
            .select(&selection)
            .map_err(|e| ForecastError::InvalidField(e.to_string()))?;
        Ok(Self {
            xs,
            ys,
            values: plane.values,
        })
    }

    fn at(&self, yi: usize, xi: usize) -> f64 {
        self.values[yi * self.xs.len() + xi] as f64
    }

    /// Bilinear interpolation; NaN outside the grid.
    fn interpolate(&self, x: f64, y: f64) -> f64 {
        let (Some((x0, x1, tx)), Some((y0, y1, ty))) = (bracket(&self.xs, x), bracket(&self.ys, y))
        else {
            return f64::NAN;
        };

        let top = self.at(y0, x0) * (1.0 - tx) + self.at(y0, x1) * tx;
        let bottom = self.at(y1, x0) * (1.0 - tx) + self.at(y1, x1) * tx;
        top * (1.0 - ty) + bottom * ty
    }
}

/// Neighbouring indices around `v` and the fraction of the way from the
/// first to the second. Works for ascending or descending coordinates.
fn bracket(coords: &[f64], v: f64) -> Option<(usize, usize, f64)> {
    if !v.is_finite() {
        return None;
    }
    if coords.len() == 1 {
        return (coords[0] == v).then_some((0, 0, 0.0));
    }
    coords.windows(2).enumerate().find_map(|(i, pair)| {
        let (a, b) = (pair[0], pair[1]);
        let inside = (a <= v && v <= b) || (b <= v && v <= a);
        inside.then(|| {
            let t = if a == b { 0.0 } else { (v - a) / (b - a) };
            (i, i + 1, t)
        })
    })
}

/// Predict the yield of every system in `model` from an irradiance field.
pub fn predict(irradiance: &GridField, model: &PvModel) -> ForecastResult<Vec<Prediction>> {
    let plane = Plane::from_field(irradiance)?;

    Ok(model
        .systems()
        .iter()
        .map(|system| {
            let value = plane.interpolate(system.easting, system.northing);
            Prediction {
                system_id: system.system_id,
                longitude: system.longitude,
                latitude: system.latitude,
                forecast_time: irradiance.valid_time,
                pv_yield_predicted: system.predict(value),
            }
        })
        .collect())
}

/// Predictions as a FeatureCollection with one point per system.
pub fn predict_as_geojson(
    irradiance: &GridField,
    model: &PvModel,
    created: DateTime<Utc>,
) -> ForecastResult<FeatureCollection> {
    let features = predict(irradiance, model)?
        .iter()
        .map(to_feature)
        .collect();

    let mut properties = JsonObject::new();
    properties.insert(
        "forecastCreationTime".to_string(),
        serde_json::json!(created.to_rfc3339_opts(SecondsFormat::Micros, false)),
    );
    let mut foreign_members = JsonObject::new();
    foreign_members.insert("properties".to_string(), serde_json::Value::Object(properties));

    Ok(FeatureCollection {
        bbox: None,
        features,
        foreign_members: Some(foreign_members),
    })
}

fn to_feature(prediction: &Prediction) -> Feature {
    let mut properties = JsonObject::new();
    properties.insert("system_id".to_string(), serde_json::json!(prediction.system_id));
    properties.insert(
        "forecastTime".to_string(),
        serde_json::json!(prediction
            .forecast_time
            .map(|t| t.format("%Y-%m-%dT%H:%M:%S").to_string())),
    );
    let yield_value = if prediction.pv_yield_predicted.is_nan() {
        serde_json::Value::Null
    } else {
        serde_json::json!(prediction.pv_yield_predicted)
    };
    properties.insert("pv_yield_predicted".to_string(), yield_value);

    Feature {
        bbox: None,
        geometry: Some(Geometry::new(Value::Point(vec![
            prediction.longitude,
            prediction.latitude,
        ]))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PvSystem;
    use chrono::TimeZone;
    use nwp_common::Dimension;

    fn system(id: i64, easting: f64, northing: f64) -> PvSystem {
        PvSystem {
            system_id: id,
            easting,
            northing,
            longitude: -1.299834,
            latitude: 54.3686,
            slope: 2.0,
            intercept: 1.0,
        }
    }

    /// realization(2) x y(2) x x(2); realization 1 is all zeros.
    fn irradiance() -> GridField {
        GridField::new(
            IRRADIANCE_VARIABLE,
            vec![
                Dimension::with_coords(REALIZATION_DIM, vec![0.0, 1.0]),
                Dimension::with_coords(Y_DIM, vec![0.0, 10.0]),
                Dimension::with_coords(X_DIM, vec![0.0, 10.0]),
            ],
            vec![100.0, 200.0, 300.0, 400.0, 0.0, 0.0, 0.0, 0.0],
        )
        .unwrap()
        .with_times(
            Utc.with_ymd_and_hms(2020, 6, 4, 9, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2020, 6, 4, 17, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_bilinear_first_realization() {
        let model = PvModel::new(vec![system(1, 5.0, 5.0), system(2, 0.0, 10.0), system(3, 2.5, 0.0)]);
        let predictions = predict(&irradiance(), &model).unwrap();

        // centre: mean of the four corners
        assert!((predictions[0].pv_yield_predicted - (2.0 * 250.0 + 1.0)).abs() < 1e-9);
        // exact grid point
        assert!((predictions[1].pv_yield_predicted - (2.0 * 300.0 + 1.0)).abs() < 1e-9);
        // quarter of the way along the bottom edge
        assert!((predictions[2].pv_yield_predicted - (2.0 * 125.0 + 1.0)).abs() < 1e-9);
    }

    #[test]
    fn test_descending_coordinates() {
        let field = GridField::new(
            IRRADIANCE_VARIABLE,
            vec![
                Dimension::with_coords(Y_DIM, vec![10.0, 0.0]),
                Dimension::with_coords(X_DIM, vec![0.0, 10.0]),
            ],
            vec![300.0, 400.0, 100.0, 200.0],
        )
        .unwrap();
        let predictions = predict(&field, &PvModel::new(vec![system(1, 5.0, 5.0)])).unwrap();
        assert!((predictions[0].pv_yield_predicted - 501.0).abs() < 1e-9);
    }

    #[test]
    fn test_outside_grid_is_null() {
        let model = PvModel::new(vec![system(973, 50.0, 5.0)]);
        let collection = predict_as_geojson(
            &irradiance(),
            &model,
            Utc.with_ymd_and_hms(2020, 6, 4, 10, 0, 0).unwrap(),
        )
        .unwrap();

        let json: serde_json::Value = serde_json::from_str(&collection.to_string()).unwrap();
        let feature = &json["features"][0];
        assert_eq!(feature["geometry"]["coordinates"], serde_json::json!([-1.299834, 54.3686]));
        assert_eq!(feature["properties"]["system_id"], 973);
        assert_eq!(feature["properties"]["forecastTime"], "2020-06-04T17:00:00");
        assert!(feature["properties"]["pv_yield_predicted"].is_null());
        assert_eq!(
            json["properties"]["forecastCreationTime"],
            "2020-06-04T10:00:00.000000+00:00"
        );
    }

    #[test]
    fn test_extra_axis_rejected() {
        let field = GridField::new(
            IRRADIANCE_VARIABLE,
            vec![
                Dimension::with_coords("height", vec![10.0, 50.0]),
                Dimension::with_coords(Y_DIM, vec![0.0]),
                Dimension::with_coords(X_DIM, vec![0.0]),
            ],
            vec![1.0, 2.0],
        )
        .unwrap();
        assert!(matches!(
            predict(&field, &PvModel::new(vec![system(1, 0.0, 0.0)])),
            Err(ForecastError::InvalidField(_))
        ));
    }
}
