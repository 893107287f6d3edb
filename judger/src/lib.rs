pub mod client;
pub mod config;
pub mod fs;
pub mod judge;
pub mod runner;
pub mod tester;
pub mod util;

#[cfg(test)]
mod test;
