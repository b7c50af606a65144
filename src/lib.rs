pub mod cli;
pub mod config;
pub mod division;
pub mod error;
pub mod export;
pub mod feed;
pub mod fetch;
pub mod http_client;
pub mod literal;
pub mod logging;
pub mod match_detail;
pub mod merge;
pub mod model;
pub mod pipeline;
pub mod standings;
pub mod store;
pub mod task;
