//! Error types for PV forecasting.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForecastError {
    #[error("Failed to read PV model: {0}")]
    ModelRead(#[from] csv::Error),

    #[error("PV model is empty")]
    EmptyModel,

    #[error("Irradiance field is unusable: {0}")]
    InvalidField(String),

    #[error("Failed to write forecast: {0}")]
    Output(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type ForecastResult<T> = Result<T, ForecastError>;
