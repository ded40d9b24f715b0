//! Integration tests for hldc-recorder.
//!
//! These tests verify the interaction between components:
//! - WebSocket connection lifecycle against a scripted server
//! - Reconnection and subscription replay
//! - End-to-end record flow into CSV files

pub mod common;
