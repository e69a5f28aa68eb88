//! lumen-io: Image decoding, PNG encoding and result file output.
//!
//! Bridges encoded image files and the pure [`lumen_pipeline`] crate:
//! [`raster::decode`] turns PNG/JPEG/BMP/WebP bytes into a
//! [`PixelBuffer`](lumen_pipeline::PixelBuffer), [`raster::encode_png`]
//! goes the other way, [`raster::process_bytes`] decodes and runs the
//! pipeline in one call, and [`download::write_result`] saves every
//! snapshot plus the final image to a directory.

pub mod download;
pub mod raster;

pub use download::{DEFAULT_FILE_NAME, snapshot_file_name, write_result};
pub use raster::{RasterError, decode, encode_png, process_bytes};
