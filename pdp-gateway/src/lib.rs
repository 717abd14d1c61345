pub mod api;
pub mod config;
pub mod error;
pub mod pdp;
pub mod service;
pub mod store;
pub mod utils;
