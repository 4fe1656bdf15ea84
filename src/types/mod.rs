//! Wire records exchanged with the broker.

mod message;

pub use message::{MODULE_NAME, Request, Response};
