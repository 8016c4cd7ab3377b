pub mod aggregate;
pub mod generate;
pub mod join;
pub mod query;
mod session;
pub mod transform;
pub mod validation;
pub mod window;

pub use query::{Aggregate, ViewQuery};
pub use session::EngineSession;
