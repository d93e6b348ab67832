pub mod api;
pub mod browser;
pub mod config;
pub mod credentials;
pub mod error;
pub mod models;
pub mod recording;
