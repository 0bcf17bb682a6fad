pub mod bounds;
pub mod extrema;
pub mod scale;

// Foundation crate: small, well-tested primitives only.
pub use bounds::*;
pub use extrema::*;
pub use scale::*;
