// src/lib.rs

pub mod db;
pub mod store;
pub mod modules;
pub mod loyalty;
pub mod services;
pub mod tasks;
pub mod test_utils;

pub use db::Database;
pub use loyalty::{LoyaltyManager, LoyaltyOptions};
pub use loyalty_common::error::Error;
pub use modules::{ModuleRegistry, ModuleRegistryBuilder};
