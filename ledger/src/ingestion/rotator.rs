use error_stack::{Result, ResultExt};
use url::Url;

use crate::error::LedgerError;

/// Round-robin cursor over a network's RPC endpoints.
///
/// Owned by the fetcher of a single network run. It never runs out: after the
/// last endpoint it wraps back to the first one.
#[derive(Debug, Clone)]
pub struct EndpointRotator {
    endpoints: Vec<Url>,
    cursor: usize,
}

impl EndpointRotator {
    pub fn new(endpoints: Vec<Url>) -> Result<Self, LedgerError> {
        if endpoints.is_empty() {
            return Err(LedgerError::Configuration).attach_printable("endpoint list is empty");
        }

        Ok(Self {
            endpoints,
            cursor: 0,
        })
    }

    /// Returns the endpoint at the cursor and advances the cursor.
    pub fn next(&mut self) -> &Url {
        let endpoint = &self.endpoints[self.cursor];
        self.cursor = (self.cursor + 1) % self.endpoints.len();
        endpoint
    }
}
