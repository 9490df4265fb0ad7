//! aegis-classifiers: classifier contracts for adversarial-robustness tooling.
//!
//! This crate defines the capability-based interface hierarchy that attack
//! and defense algorithms program against (base, neural-network, gradient,
//! and decision-tree capabilities), the canonical input containers every
//! entry point coerces to, and the defence pipeline (clip bounds,
//! preprocessing/postprocessing chains, standardization) that all concrete
//! adapters share. Framework-specific adapters and the attack
//! implementations themselves live in surrounding crates; two small
//! reference backends are included so the contracts are exercised in-tree.
pub mod classifiers;
pub mod config;
pub mod defences;
pub mod error;
pub mod generators;
pub mod input;
pub mod preprocessing;
pub mod trees;
