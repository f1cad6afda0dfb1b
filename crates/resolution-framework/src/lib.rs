//! Dispatch runtime for remote resource resolvers.
//!
//! A resolver backend implements [`Resolver`]; [`ResolverController`] binds
//! it to a [`RecordStore`], routes records whose labels match the
//! resolver's selector into a [`WorkQueue`], and runs the record lifecycle
//! for each key:
//!
//! 1. absent records and records claimed by another resolver are ignored;
//! 2. terminal records are never touched again;
//! 3. a record with a payload is marked succeeded;
//! 4. a record past its budget is marked failed (`ResolutionTimedOut`);
//! 5. otherwise the record is stored as in progress, a re-check is
//!    scheduled for when its budget runs out, and the resolver validates
//!    and resolves under the remaining budget. The outcome is written with
//!    an optimistic-concurrency status update. Conflicts re-run the whole
//!    pass.
//!
//! [`ClusterController`] runs the same passes under
//! `kube::runtime::Controller` for records stored in the API server.
//!
//! Which resolver claims a record is decided purely by label equality. The
//! framework does not detect two resolvers whose selectors overlap;
//! deployments must keep resolver types unique.

pub mod controller;
pub mod error;
pub mod queue;
pub mod reconciler;
pub mod resolver;
pub mod runtime;
pub mod selector;
pub mod state;
pub mod store;
pub mod telemetry;

pub use controller::ResolverController;
pub use error::{FrameworkError, ResolverError, Result, StoreError};
pub use queue::{Backoff, WorkQueue};
pub use reconciler::{ReconcileOutcome, Reconciler};
pub use resolver::{Params, Resolver, ResolverContext, optional, require, type_selector};
pub use runtime::ClusterController;
pub use selector::{
    label_selector, queue_name, sanitize_name, selector_matches, validate_selector,
};
pub use state::{Decision, evaluate};
pub use store::{KubeRecordStore, MemoryRecordStore, RecordEvent, RecordStore, RecordStream};
