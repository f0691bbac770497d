//! I/O helpers for the engine.

pub mod artifact_log;
pub mod config;
pub mod controller;
pub mod fingerprint;
pub mod git;
pub mod paths;
pub mod plan_store;
