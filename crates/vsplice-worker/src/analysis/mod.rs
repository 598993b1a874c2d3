//! Default reduction and clustering capabilities.

pub mod density;
pub mod projection;

pub use density::DensityClusterer;
pub use projection::RandomProjectionReducer;
