//! Wire types exchanged with the backend API

mod report;
mod user;

pub use report::*;
pub use user::*;
