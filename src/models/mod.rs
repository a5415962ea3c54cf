// src/models/mod.rs

pub mod prize;
pub mod question;
pub mod result;
pub mod session;
pub mod wallet;
