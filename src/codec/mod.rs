//! Value codecs shared by the wire layer.
//!
//! - [`unicode`]: UTF-16BE conversion for Unicode-kind header values
//! - [`app_params`]: tag/length/value sub-codec for `AppParameters`

pub mod app_params;
pub mod unicode;

pub use app_params::TagParam;
