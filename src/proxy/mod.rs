pub mod connector;
pub mod forwarder;
pub mod header;
pub mod session;
pub mod tls_acceptor;
