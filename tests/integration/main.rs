//! Integration tests

mod common;
mod e2e_test;
mod lifecycle_test;
mod sync_test;
