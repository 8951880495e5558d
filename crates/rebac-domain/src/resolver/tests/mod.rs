//! Tests for the graph resolver module.
//!
//! Organized by functionality:
//! - Direct tuple resolution
//! - Computed relations (tuple-to-userset)
//! - Union, intersection and exclusion relations
//! - Contextual tuples
//! - Safety features (depth limiting, cycle detection, timeouts)
//! - Type constraints and wildcards
