//! Integration tests for goplug-lib.

mod build_tests;
mod common;
mod delegation_tests;
