mod alphabet;
mod builder;
mod common;
mod error;
mod loader;
mod query;
mod store;

pub use alphabet::*;
pub use builder::*;
pub use common::*;
pub use error::*;
pub use loader::*;
pub use query::*;
pub use store::*;
