//! Orion - regression and anomaly detection over benchmark run history
//!
//! This library decides whether a series of repeated benchmark runs shows a
//! sustained level shift (change-point detection) or outlier runs (weighted
//! isolation-forest anomaly detection) and renders the verdicts per test.

pub mod algorithm;
pub mod anomaly;
pub mod change_point;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod error;
pub mod isolation_forest;
pub mod source;
pub mod table;
