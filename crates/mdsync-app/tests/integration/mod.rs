//! Integration tests for mdsync.
//!
//! These tests verify the interaction between components:
//! - WebSocket connection lifecycle and subscription restore
//! - Routing of pushed data into the streaming view
//! - Staleness handling against a silent server

pub mod common;
