pub mod api;
pub mod config;
pub mod diff_block;
pub mod patch;
pub mod render;
pub mod session;
pub mod stream;
pub mod types;
pub mod util;

#[cfg(test)]
mod test_support;
