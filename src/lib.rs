//! Track-level remux modelling on top of ffmpeg.
//!
//! Source files are probed into containers of editable tracks. Output
//! containers select and order tracks from any number of sources and are
//! turned into one ffmpeg invocation each, tracked through a status log.

pub mod analyzer;
pub mod chapters;
pub mod config;
pub mod container;
pub mod conversion;
pub mod error;
pub mod ids;
pub mod library;
pub mod mixer;
pub mod overlay;
pub mod tracks;
pub mod utils;

pub use error::{Error, Result};
pub use library::Library;
