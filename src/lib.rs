pub mod auth;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod messaging;
pub mod models;
pub mod sync;
pub mod window;
