//! Module I: prediction & reconciliation.

pub mod client;
pub mod server;

pub use client::ClientPrediction;
pub use server::{dead_reckon, InputValidator};
