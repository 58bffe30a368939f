//! Transport stream scanner core.
//!
//! Sweeps a channel raster, decodes the PSI/SI tables of every locked
//! transponder and writes the discovered services as VDR channel lines
//! or JSON. Section decoding lives in the `tscan-si` crate; this crate
//! holds the channel model, the section filter scheduler and the scan
//! driver.

pub mod adapter;
pub mod channels;
pub mod error;
pub mod model;
pub mod output;
pub mod scan;
