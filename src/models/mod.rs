// src/models/mod.rs

pub mod attempt;
pub mod class;
pub mod exam;
pub mod question;
pub mod user;
