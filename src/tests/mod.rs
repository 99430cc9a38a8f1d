//! Scenario tests.
//!
//! These drive whole lifecycles against a seeded in-memory engine and check the
//! resulting catalog, rows and reports.

mod harness;
