// src/models/mod.rs

pub mod access;
pub mod analytics;
pub mod exam_session;
pub mod practice;
pub mod question;
pub mod streak;
pub mod user;
