//! Dict integration tests

mod dict_tests;
mod expiry_tests;
