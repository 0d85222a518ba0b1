//! Event handlers
//!
//! Built-in state handlers, the user handler registry, and the dispatcher
//! that feeds both.

mod builtin;
mod dispatcher;
mod error;
mod registry;

pub use builtin::ClientCache;
pub use dispatcher::Dispatcher;
pub use error::RegistrationError;
pub use registry::HandlerRegistry;
