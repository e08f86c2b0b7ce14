pub mod chronicle;
pub mod collection;
pub mod common;
pub mod completions;
pub mod config;
pub mod entity;
pub mod harmonize;
pub mod service;
