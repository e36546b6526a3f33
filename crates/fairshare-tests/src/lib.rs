//! Integration test suite for the fairshare usage ledger.
//!
//! Exercises full update passes across the decay engine, the bank-tree
//! aggregator, and both ledger stores. Shared fixtures live in [`helpers`].

pub mod helpers;
