pub mod api;
pub mod app;
pub mod commands;
pub mod config;
pub mod logging;
pub mod state;
pub mod tools;
pub mod types;
pub mod util;

#[cfg(test)]
mod test_support;
