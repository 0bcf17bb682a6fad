pub mod capabilities;
pub mod error;
pub mod extrema;
pub mod labels;
pub mod layer;
pub mod params;
pub mod raster;
pub mod state;
pub mod symbology;
pub mod topics;

pub use capabilities::*;
pub use error::*;
pub use extrema::*;
pub use layer::*;
pub use params::*;
pub use state::*;
