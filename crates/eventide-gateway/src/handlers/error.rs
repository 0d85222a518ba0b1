//! Handler registration errors

use thiserror::Error;

use crate::events::EventKind;

/// Handler registration error type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegistrationError {
    /// The client's event registry does not decode this kind, so the
    /// handler could never fire
    #[error("event {0} is not decoded by this client")]
    UndecodableKind(EventKind),
}
