pub mod dataset;
pub mod device;
pub mod error;
pub mod model;
pub mod training;
pub mod verdict;
pub mod video;

pub use error::{DetectorError, Result};
