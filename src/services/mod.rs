//! Client-side services: the session gate and the bookmark sync controller.
//!
//! ARCHITECTURE
//! ============
//! The gate is the entry point and owns the controller. Both operate on the
//! shared view state and reach the platform only through the `backend`
//! traits, so the terminal app and the tests drive the same code.

pub mod gate;
pub mod sync;
