// File: src/tasks/mod.rs

pub mod points_award;

pub use points_award::{award_points_once, spawn_points_award_task, ActivityTracker};
