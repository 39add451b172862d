//! Token parsing and claim handling.

pub mod jwt;
