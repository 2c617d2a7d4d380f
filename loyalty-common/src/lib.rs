// File: loyalty-common/src/lib.rs

pub mod error;
pub mod keys;
pub mod models;
pub mod traits;

pub use error::Error;
