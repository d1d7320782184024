// src/services/mod.rs

pub mod access;
pub mod analytics;
pub mod calendar;
pub mod mock_exam;
pub mod practice;
pub mod sampler;
pub mod streak;
pub mod subscription;
