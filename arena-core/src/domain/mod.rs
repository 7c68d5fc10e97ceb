//! Core domain types
//!
//! These types describe what a caller asks the backend to run and what the
//! backend reports back. They carry no backend-specific detail.

pub mod game;
pub mod request;
pub mod watch;
