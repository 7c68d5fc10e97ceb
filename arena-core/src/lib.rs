//! Arena Core
//!
//! Core types shared by the job client and the command-line tool.
//!
//! This crate contains:
//! - Domain types: games, projects, game types and the job requests built from them
//! - Watch types: the backend-neutral events a workload emits while it runs

pub mod domain;
