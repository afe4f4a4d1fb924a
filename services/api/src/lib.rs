pub mod adapters;
pub mod config;
pub mod error;
pub mod extract;
pub mod pipeline;
pub mod web;
