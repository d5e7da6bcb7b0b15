//! TLS-terminating stream relay.
//!
//! Each accepted TLS connection begins with a short header naming a
//! destination host and port; the relay dials that destination over plain
//! TCP and then forwards bytes in both directions until either side closes.

pub mod cert;
pub mod config;
pub mod error;
pub mod proxy;

pub use config::{Config, LogFormat};
pub use error::{Error, Result};
pub use proxy::header::{Header, HeaderParser, HeaderState};
pub use proxy::tls_acceptor::RelayListener;
