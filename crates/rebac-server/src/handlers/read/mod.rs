//! Filtered, paginated tuple reads.
//!
//! A read names an object (`type:id`, or `type:` for every object of a
//! type), and optionally a relation and a user. Reading a whole store is
//! only allowed with an entirely empty filter.
//!
//! Results are ordered by `(object, relation, user)`; the continuation token
//! of one page resumes the next.

mod handler;
mod types;

pub use handler::ReadQuery;
pub use types::{ReadError, ReadRequest, ReadResponse, ReadResult, DEFAULT_READ_PAGE_SIZE};

#[cfg(test)]
mod tests;
