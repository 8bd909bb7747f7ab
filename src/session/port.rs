//! Local port allocation for the harness tunnel

use std::net::{Ipv4Addr, TcpListener};

use crate::common::{Error, Result};

/// Hands out a local port for the forwarded harness connection
pub trait PortAllocator: Send + Sync {
    fn allocate(&self) -> Result<u16>;
}

/// Asks the kernel for a free port by binding `127.0.0.1:0`
///
/// The listener is closed again before returning, so the port is only
/// likely, not guaranteed, to still be free when adb binds it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalPortAllocator;

impl PortAllocator for LocalPortAllocator {
    fn allocate(&self) -> Result<u16> {
        let listener =
            TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).map_err(Error::PortAllocation)?;
        let port = listener.local_addr().map_err(Error::PortAllocation)?.port();
        tracing::debug!(port, "Allocated local port");
        Ok(port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocates_usable_port() {
        let port = LocalPortAllocator.allocate().unwrap();
        assert_ne!(port, 0);
        // The port was released and can be bound again
        TcpListener::bind((Ipv4Addr::LOCALHOST, port)).unwrap();
    }
}
