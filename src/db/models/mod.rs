//! Database models, one module per table.

pub mod session;
pub mod task;
pub mod user;

pub use session::*;
pub use task::*;
pub use user::*;
