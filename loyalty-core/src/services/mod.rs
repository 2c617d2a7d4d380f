// File: src/services/mod.rs

pub mod loyalty_commands;

pub use loyalty_commands::{handle_loyalty_command, ChatUser};
