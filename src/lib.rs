//! Day-ahead electricity spot price forecasting from weather data.
//!
//! Historical prices from SMARD and weather/irradiance from Open-Meteo are
//! joined into an hourly feature table. A least-squares fit rescales every
//! column, then k-nearest-neighbour regression over the rescaled rows
//! estimates prices for the forecast horizon.

pub mod api;
pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod forecast;
pub mod ml;
pub mod telemetry;

pub use error::{PredictorError, Result};
