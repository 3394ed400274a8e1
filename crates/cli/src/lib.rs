pub mod cli;
pub mod commands;
pub mod discovery;
pub mod error;
pub mod logging;
pub mod manifest;
