// Modules
pub mod binning;
pub mod booster;
pub mod config;
pub mod constants;
pub mod data;
pub mod ensemble;
pub mod errors;
pub mod gbq;
pub mod io;
pub mod model;
pub mod noncrossing;
pub mod objective;
pub mod rescale;
pub mod sampler;
pub mod sarix;
pub mod submission;
pub mod transform;
pub mod tree;
pub mod utils;

// Individual classes, and functions
pub use booster::{BoosterConfig, FittedQuantileBooster, QuantileBooster};
pub use config::{ConfigIO, GbqConfig, RunConfig, SarixConfig};
pub use data::{FeatureTable, Matrix, QuantileLevel};
pub use ensemble::{EnsembleOutput, PredictionTensor, QuantileEnsembleTrainer};
pub use errors::FlucastError;
pub use gbq::{run_gbq, run_gbq_with_booster, GbqForecast};
pub use model::{FittedModel, Trainable};
pub use noncrossing::QuantileNoncrossingEnforcer;
pub use rescale::InverseRescaler;
pub use sampler::SeasonalBaggingSampler;
pub use sarix::{run_sarix, AutoregressiveBootstrap, PosteriorSampler, SarixForecast};
pub use submission::{QuantileRow, SubmissionFormatter};
pub use transform::PowerTransform;
