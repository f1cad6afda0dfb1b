//! Shared types for remote resource resolution.
//!
//! A requester that needs a remote resource (a Task or Pipeline stored in a
//! git repository, an OCI bundle or a catalog) creates a [`ResourceRequest`]
//! record labelled with a resolver type. A resolver process claims matching
//! records, fetches the content and writes it back into the record's status.
//!
//! This crate holds the pieces both sides agree on: the record schema, the
//! `Succeeded` condition helpers, the reserved label/annotation/reason keys
//! and the [`ResolvedResource`] contract.

pub mod condition;
pub mod error;
pub mod keys;
pub mod request;
pub mod resource;

pub use condition::{CONDITION_SUCCEEDED, Condition, ConditionStatus};
pub use error::{Error, Result};
pub use keys::*;
pub use request::{ObjectKey, ResourceRequest, ResourceRequestSpec, ResourceRequestStatus};
pub use resource::{ResolvedResource, Resource};
