pub mod data_header;
pub mod error;
pub mod format_version;
pub mod signal;

pub use data_header::*;
pub use error::*;
pub use format_version::*;
pub use signal::*;
