//! querybench API - management REST client
//!
//! This crate talks to the database proxy's JSON:API-style management
//! endpoint. The `ManagementApi` trait is the seam between lifecycle logic
//! and HTTP; `HttpManagementApi` is the reqwest-backed implementation and
//! `MockApi` a scripted in-memory server for tests.

mod api;
mod client;
pub mod test_util;

pub use api::{ManagementApi, OpenConnRequest};
pub use client::{ApiConfig, HttpManagementApi};
pub use test_util::MockApi;
