//! Unit tests for individual components

#[path = "unit/audit_test.rs"]
mod audit_test;
#[path = "unit/builders_test.rs"]
mod builders_test;
#[path = "unit/config_test.rs"]
mod config_test;
#[path = "unit/error_test.rs"]
mod error_test;
#[path = "unit/util_test.rs"]
mod util_test;
