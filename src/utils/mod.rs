//! Utils module - logging setup and credential masking

pub mod logging;
pub mod sanitize;
