//! Upgradarr - scheduled quality-upgrade searches for media managers
//!
//! Keeps a persistent per-provider queue of items whose current file scores
//! below their quality profile's cutoff, and asks the provider to search for
//! a small batch of them on every scheduled tick.

pub mod app_mode;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod logging;
pub mod providers;
pub mod services;
