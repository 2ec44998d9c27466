//! Port allocation for server-paired subjects
//!
//! Each server-paired invocation binds a fresh port so a server still in
//! TIME_WAIT from the previous point cannot collide with the next one. The
//! allocator is owned by one engine; nothing is shared between engines.

use crate::{Error, Result};

/// First port handed out by [`PortAllocator::default`].
pub const DEFAULT_PORT_BASE: u16 = 12345;

/// Monotonic port counter.
#[derive(Debug, Clone)]
pub struct PortAllocator {
    next: Option<u16>,
}

impl PortAllocator {
    /// Start allocating at `base`.
    #[must_use]
    pub const fn new(base: u16) -> Self {
        Self { next: Some(base) }
    }

    /// Hand out the next port.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PortsExhausted`] once port 65535 has been handed out.
    pub fn allocate(&mut self) -> Result<u16> {
        let port = self.next.ok_or(Error::PortsExhausted)?;
        self.next = port.checked_add(1);
        Ok(port)
    }

    /// Port the next call to [`allocate`](Self::allocate) returns.
    #[must_use]
    pub const fn peek(&self) -> Option<u16> {
        self.next
    }
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_PORT_BASE)
    }
}
