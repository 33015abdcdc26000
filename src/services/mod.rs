// src/services/mod.rs

pub mod analytics;
pub mod attempt;
pub mod catalog;
pub mod sanitizer;
pub mod scoring;
