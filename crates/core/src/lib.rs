#![doc = include_str!("../README.md")]

pub mod cms;
pub mod config;
pub mod error;
pub mod event;
pub mod metrics;
pub mod pipeline;
pub mod types;
pub mod window;
