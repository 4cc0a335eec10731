//! # geokrig core
//!
//! Core types shared by the geokrig estimation pipeline.
//!
//! This crate provides:
//! - `SpatialTable`: features with a polygon geometry and named attributes
//! - `UnitVector`: great-circle geometry on the unit sphere, in degrees
//! - `Error` / `Result`: the error kinds raised by every pipeline stage

pub mod error;
pub mod geodesy;
pub mod table;

pub use error::{Error, Result};
pub use geodesy::{GeoPoint, UnitVector};
pub use table::{AttributeValue, Feature, SpatialTable};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::geodesy::{GeoPoint, UnitVector};
    pub use crate::table::{AttributeValue, Feature, SpatialTable};
}
