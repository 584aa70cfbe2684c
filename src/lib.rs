pub mod analytics;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod materialize;
pub mod pipeline;
pub mod request;
pub mod resolve;
pub mod utils;
pub mod web;
