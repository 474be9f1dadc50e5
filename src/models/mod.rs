// src/models/mod.rs

pub mod assessment;
pub mod profile;
pub mod retry;
