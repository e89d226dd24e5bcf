//! Frequency-domain filtering and channel isolation

mod fft;
mod isolate;
mod wiener;

pub use isolate::{
    isolate_channels, qq_threshold, quantile_rows, ChannelIsolation, QqFit, QuantileRow,
};
pub use wiener::{wiener_filter, wiener_memory_estimate, WienerFilter, WienerParams};
