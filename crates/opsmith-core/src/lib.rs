pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::OpsConfig;
pub use error::{OpsError, Result};
pub use types::*;
