//! Eductl library - exposes CLI parsing and command execution for testing

pub mod cli;
pub mod commands;
