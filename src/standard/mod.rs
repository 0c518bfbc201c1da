//! Regulatory standard calculations
//!
//! Derives spectrum analyzer settings and limit-line breakpoints from the
//! channel width and band edges.

mod en_300_220;

pub use en_300_220::{
    occupied_bandwidth_parameters, operating_channel_mask, operational_band_mask,
    operational_band_view, out_of_band_parameters, Detector, LimitPoint,
};
