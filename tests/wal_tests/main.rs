//! WAL integration tests
