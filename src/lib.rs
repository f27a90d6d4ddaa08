//! Clinic management backend: patient records, doctor rosters, user
//! administration and dashboard aggregates over SQLite, served as a
//! JSON API.

pub mod api;
pub mod authorization;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod models;
pub mod validation;
