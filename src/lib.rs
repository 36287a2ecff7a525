//! SkillSwap - peer-to-peer skill exchange backend
//!
//! This library provides user accounts, login sessions with presence
//! tracking, and fuzzy skill matching behind a JSON HTTP API.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
