//! statlab: statistical modelling library
//!
//! Likelihood models (multinomial logit, Poisson, probit), a random-walk
//! Metropolis-Hastings sampler, k-means and k-nearest-neighbour learners,
//! field-experiment tests and LLN/CLT simulations, with loaders for CSV,
//! Parquet and Stata `.dta` files.

pub mod cli;
pub mod pipeline;
pub mod report;
pub mod utils;
