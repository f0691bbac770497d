//! Deterministic, pure logic shared by the engine.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod budget;
pub mod halt;
pub mod lifecycle;
pub mod risk;
pub mod sanitizer;
pub mod scheduler;
pub mod types;
pub mod validator;
