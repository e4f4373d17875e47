//! querybench query - running queries from the editor
//!
//! The `QueryRunner` executes editor text over a tab's connection with
//! cancellation support, maintains the tab's transient result state and the
//! query history, and serves table previews. Stopping a query is server-side
//! first: the in-flight client request is only aborted once `KILL QUERY`
//! confirms the server thread was interrupted.

mod runner;

pub use runner::QueryRunner;
