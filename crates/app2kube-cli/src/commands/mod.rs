//! CLI commands

pub mod manifest;
pub mod config;

// Cluster commands
pub mod apply;
pub mod delete;
pub mod track;
pub mod blue_green;
