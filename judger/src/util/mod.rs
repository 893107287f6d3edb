pub mod async_teardown;
mod deserialize;
pub mod names;
pub mod path_security;

pub use async_teardown::*;
pub use deserialize::*;
