//! Reading and writing georeferenced grids
//!
//! GeoTIFF support is native (the `tiff` crate); no GDAL install is needed.

mod native;

pub use native::{
    read_geotiff, read_geotiff_from_buffer, write_geotiff, write_geotiff_to_buffer,
    GeoTiffOptions,
};
