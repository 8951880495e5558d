//! Request handlers.
//!
//! Each handler owns its storage access and returns domain results; the
//! transport layer on top only maps requests and errors.

pub mod list_objects;
pub mod model;
pub mod read;

pub use list_objects::{ListObjectsHandler, StreamedListObjectsResponse};
pub use model::WriteModelCommand;
pub use read::{ReadError, ReadQuery, ReadRequest, ReadResponse};
