pub mod core;
pub mod dataset;
pub mod export;
pub mod session;
pub mod views;
