// ABOUTME: Shared helpers for integration tests.
// ABOUTME: Hosts the in-process SSH server the suites run against.

pub mod server;
