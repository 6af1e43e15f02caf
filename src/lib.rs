pub mod classifier;
pub mod config;
pub mod error;
pub mod mailstore;
pub mod metadata;
pub mod models;
pub mod output;
pub mod parser;
pub mod stats;
pub mod unsubscribe;
pub mod workflow;
