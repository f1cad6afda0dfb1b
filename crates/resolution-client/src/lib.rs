//! Requester facade for remote resource resolution.
//!
//! ```rust,ignore
//! let requester = Requester::new(store);
//! let req = BasicRequest::new(deterministic_name("git", "ci/run-1", &params), "ci", params);
//! match requester.submit("git", &req).await {
//!     Ok(resource) => use_it(resource.data()),
//!     Err(e) if e.is_retryable() => poll_again_later(),
//!     Err(e) => fail(e),
//! }
//! ```

pub mod error;
pub mod request;
pub mod requester;

pub use error::{RequestError, Result};
pub use request::{
    BasicRequest, Request, append_owner_reference, deterministic_name, owner_refs_equal,
};
pub use requester::Requester;
