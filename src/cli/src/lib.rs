//! Verity CLI - operator tooling for host trust resolution.

pub mod commands;
pub mod output;
