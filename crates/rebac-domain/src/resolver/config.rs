//! Configuration for the graph resolver.

use std::time::Duration;

/// Depth at which a Check path gives up.
pub const DEFAULT_MAX_DEPTH: u32 = 25;

/// Time budget of a single Check.
pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(30);

/// Limits applied to every Check, including the ones ListObjects issues to
/// verify candidates.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub max_depth: u32,
    pub timeout: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            timeout: DEFAULT_CHECK_TIMEOUT,
        }
    }
}

impl ResolverConfig {
    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
