//! Integration tests for the bugs loader

mod config_integration;
mod end_to_end;
mod logging_init;
mod source_loading;
mod sweep_reconciliation;
mod test_utils;
