//! Tessera - persistence engine for an OAuth2 authorization server
//!
//! Stores clients, tokens, authorization codes, rate-limit counters and
//! consent grants behind one backend-agnostic contract
//! ([`storage::StorageAdapter`]) with two interchangeable engines.

pub mod entities;
pub mod errors;
pub mod settings;
pub mod storage;
