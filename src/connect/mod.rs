//! Connection establishment layer.
//!
//! [`Driver`] is the seam over the concrete database primitives (open, ping,
//! collect, close). [`establish`] sits on top of it and applies the
//! transport-security fallback policy for the "prefer" mode, isolating
//! failures per target.

mod driver;
mod establish;
mod postgres;

pub use driver::{ConnectError, Driver, WireSsl};
pub use establish::establish;
pub use postgres::PostgresDriver;
