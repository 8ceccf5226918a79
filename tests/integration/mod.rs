//! Integration test suite for drover.
//!
//! These tests exercise the full orchestration path: inventory parsing and
//! pattern resolution, bounded dispatch against a scripted engine, and
//! result normalization into stable summaries.
//!
//! # Test Categories
//!
//! - `inventory_resolution`: parsing, patterns, and variable precedence
//! - `diagnostics_run`: fleet diagnostics end to end
//! - `playbook_run`: remediation runs end to end
//!
//! # CI Compatibility
//!
//! A scripted engine stands in for the fleet tool, so the suite needs no
//! external binaries and no network access.


mod diagnostics_run;
mod playbook_run;
