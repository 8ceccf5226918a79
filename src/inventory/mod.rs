//! Inventory parsing and host pattern resolution.
//!
//! The inventory side of the orchestrator: [`Inventory`] parses the
//! declarative host file into groups with validated nesting and merged
//! variables, and [`resolve`] expands a target pattern into an ordered,
//! deduplicated host list.

mod parse;
mod pattern;

pub use parse::{Group, Inventory, InventoryOverview, VarMap};
pub use pattern::{resolve, ResolvedTargets};
