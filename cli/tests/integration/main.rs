//! Integration tests for mc-auto
//!
//! These tests spawn the actual binary and test end-to-end behavior that
//! does not need a cloud account.
