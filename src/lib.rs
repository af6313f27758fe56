pub mod app;
pub mod clock;
pub mod config;
pub mod domain;
pub mod error;
pub mod output;
pub mod pool;
pub mod retry;
pub mod runner;
pub mod sink;
pub mod transport;
