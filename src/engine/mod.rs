//! # Engine Module
//!
//! Record store and scheduling substrate.
//!
//! This module contains the core building blocks:
//! - Archetypes and column storage
//! - Record handles and allocation
//! - Queries
//! - Deferred commands
//! - Systems and the dependency-aware scheduler
//!
//! Public API exposure is controlled by `lib.rs`.

pub mod types;
pub mod error;
pub mod component;
pub mod storage;
pub mod entity;
pub mod archetype;
pub mod query;
pub mod commands;
pub mod systems;
pub mod scheduler;
pub mod manager;
