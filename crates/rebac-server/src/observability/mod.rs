//! Observability infrastructure for the rebac server.
//!
//! Structured logging through `tracing-subscriber`, in text or JSON form.

mod logging;

pub use logging::init_logging;
