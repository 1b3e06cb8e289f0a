pub mod core;

pub use crate::core::config::{PackConfig, Side};
pub use crate::core::error::{PackError, PackResult};
pub use crate::core::job::report::JobReport;
