pub mod backend;
pub mod config;
pub mod session;
pub mod transcript;
