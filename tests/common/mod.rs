//! Integration test common infrastructure.
//!
//! Provides an in-memory server, a scripted stream, and an event recorder
//! for asserting on what a client publishes.

pub mod client;
pub mod server;

#[allow(unused_imports)]
pub use client::{EventLog, Recorded, mock_client, mock_client_with, settle, within};
#[allow(unused_imports)]
pub use server::{MockServer, Plan, ScriptedStream, ServerConn, mock_pair};
