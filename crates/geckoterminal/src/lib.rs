pub mod client;
pub mod transport;

pub use client::{ClientError, GeckoTerminalClient, PaginatedFetch};
pub use transport::{HttpTransport, Transport, TransportError};
