pub mod audio;
pub mod config;
pub mod error;
pub mod fetch;
pub mod jobs;
pub mod pipeline;
pub mod server;
pub mod tag;
