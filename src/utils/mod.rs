pub mod error;

pub use error::{RelayError, TransportError, ValidationError};
