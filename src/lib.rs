//! An append-and-echo TCP service with a bounded write-history buffer.
//!
//! Clients connect, send one newline-terminated packet, and receive the
//! entire accumulated history back before the connection closes. Packets are
//! committed atomically under a single history lock, so concurrent clients
//! each observe a consistent prefix of the commit order that includes their
//! own packet.

pub mod app;
pub mod cli;
pub mod config;
pub mod connection;
pub mod daemon;
pub mod framing;
pub mod history;
pub mod server;
pub mod shutdown;
pub mod store;
pub mod timestamp;
pub mod trace;
