pub mod error;
pub mod logger;
pub mod privacy;
pub mod validation;
