//! Report module - console tables, terminal plots and exports

pub mod export;
pub mod plot;
pub mod summary;

pub use export::*;
pub use plot::*;
pub use summary::*;
