//! Estimation pipeline modules

pub mod choice;
pub mod dta;
pub mod encoding;
pub mod error;
pub mod experiment;
pub mod kmeans;
pub mod knn;
pub mod linalg;
pub mod loader;
pub mod mcmc;
pub mod mnl;
pub mod optim;
pub mod poisson;
pub mod simulate;
pub mod stats;

pub use choice::*;
pub use dta::{load_dta, read_dta, DtaError};
pub use encoding::*;
pub use error::ModelError;
pub use experiment::*;
pub use kmeans::*;
pub use knn::*;
pub use loader::*;
pub use mcmc::*;
pub use mnl::*;
pub use optim::{fit_mle, minimize_bfgs, BfgsConfig, MleFit, Objective, OptimResult};
pub use poisson::*;
pub use simulate::*;
pub use stats::*;
