mod db_executor;
mod store;
pub mod auth;
pub mod stats;
pub mod visibility;

pub use db_executor::*;
pub use store::*;

#[cfg(test)]
pub mod test_support;
