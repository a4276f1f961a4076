//! Shared infrastructure for simsrv services
//!
//! Keeps the pieces every service binary needs but no domain crate should
//! own: logging initialization, shutdown signal handling and the common API
//! response envelope.

pub mod api_types;
pub mod logging;
pub mod shutdown;
