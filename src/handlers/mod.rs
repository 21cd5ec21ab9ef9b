// src/handlers/mod.rs

pub mod attempts;
pub mod auth;
pub mod classes;
pub mod exams;
pub mod grading;
