//! Core of the free-promotion watcher: the refresh-aggregate-alert
//! pipeline over a private tracker's search API.

pub mod alerts;
pub mod config;
pub mod error;
pub mod models;
pub mod remaining;
pub mod scheduler;
pub mod service;
