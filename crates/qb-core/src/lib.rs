//! querybench core - shared types for the query workbench engine
//!
//! This crate provides the fundamental types that all other querybench
//! crates depend on:
//!
//! - Entity ids (`WorksheetId`, `QueryTabId`, `ConnId`)
//! - Entity records (`Worksheet`, `QueryTab`, `QueryConn`)
//! - The connection state machine (`ConnectionPhase`)
//! - Wire types for the management API's query results
//! - Common SQL string helpers (identifier quoting)

mod entities;
mod error;
mod ids;
mod results;
pub mod sql_util;

pub use entities::*;
pub use error::*;
pub use ids::*;
pub use results::*;
