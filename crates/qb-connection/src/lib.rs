//! querybench connection - the connection lifecycle
//!
//! The `ConnectionController` owns every transition of the connection state
//! machine: opening a worksheet connection and fanning clones out to its
//! query tabs, switching a worksheet to another connection, cascade
//! teardown, reconciling local records against the server's alive-set and
//! reconnecting dropped sessions.

mod categorize;
mod controller;

pub use categorize::{Categorized, categorize};
pub use controller::{ConnectionController, OpenTarget};
