// src/handlers/mod.rs

pub mod analytics;
pub mod mock_exam;
pub mod practice;
pub mod streak;
pub mod subscription;
