//! Errors
//!
//! Custom error types used throughout the `flucast` crate.
use thiserror::Error;

/// Errors that can occur while producing a forecast.
#[derive(Debug, Error)]
pub enum FlucastError {
    /// First value is the name of the parameter, second is expected, third is what was passed.
    #[error("Invalid parameter value passed for {0}, expected {1} but {2} provided.")]
    InvalidParameter(String, String, String),
    /// Invalid value parsing.
    #[error("Invalid value {0} passed for {1}, expected one of {2}.")]
    ParseString(String, String, String),
    /// The reference date is not usable for a weekly forecast.
    #[error("Invalid reference date {0}: {1}")]
    InvalidReferenceDate(String, String),
    /// No training rows carry a target value.
    #[error("No training rows with a non-missing target; no model can be fit.")]
    EmptyTrainingTarget,
    /// No rows are available at the forecast origin.
    #[error("No test rows available at the most recent date.")]
    EmptyTestSet,
    /// A bag drew zero seasons.
    #[error("Bag {0} contains no seasons ({1} seasons available, bag fraction {2}).")]
    EmptyBag(usize, usize, f64),
    /// A quantile regressor could not be fit.
    #[error("Fitting the model for bag {bag}, quantile level {quantile} failed: {reason}")]
    FitFailed { bag: usize, quantile: f64, reason: String },
    /// The learner rejected its inputs.
    #[error("Unable to fit model: {0}")]
    InvalidTrainingData(String),
    /// Noncrossing repair found a forecast unit missing quantile levels.
    #[error("Forecast unit {0} has {1} quantile levels, expected {2}.")]
    IncompleteQuantileGroup(String, usize, usize),
    /// Input table is missing a required column.
    #[error("Required column {0} not found in input.")]
    MissingColumn(String),
    /// A value in the input table could not be parsed.
    #[error("Unable to parse value {0} in column {1}.")]
    ParseValue(String, String),
    /// Series shapes are inconsistent.
    #[error("Inconsistent series shape: {0}")]
    ShapeMismatch(String),
    /// Posterior sampling failed.
    #[error("Posterior sampling failed: {0}")]
    SamplingFailed(String),
    /// Unable to write output to file.
    #[error("Unable to write to file: {0}")]
    UnableToWrite(String),
    /// Unable to read input from file.
    #[error("Unable to read from file {0}")]
    UnableToRead(String),
}

impl From<csv::Error> for FlucastError {
    fn from(e: csv::Error) -> Self {
        FlucastError::UnableToRead(e.to_string())
    }
}
