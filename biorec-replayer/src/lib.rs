pub mod config;
pub mod error;
pub mod metrics;
pub mod session;

pub use config::*;
pub use error::*;
pub use metrics::*;
pub use session::*;
