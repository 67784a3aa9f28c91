//! PostgreSQL access for planscan.
//!
//! The `houses` table is owned by the registration subsystem; this crate only
//! touches the plan-analysis columns on it.

pub mod config;
pub mod models;
pub mod pool;
pub mod queries;
