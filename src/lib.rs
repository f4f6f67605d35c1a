pub mod api;
pub mod config;
pub mod download;
pub mod humanize;
pub mod observability;
pub mod progress;
pub mod tools;
