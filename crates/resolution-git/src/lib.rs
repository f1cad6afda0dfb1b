//! Git resolver backend.
//!
//! Claims records labelled `resolution.tekton.dev/type: git` and returns
//! the contents of one file from a repository.
//!
//! | Parameter | Required | Meaning                                        |
//! |-----------|----------|------------------------------------------------|
//! | `url`     | yes*     | Repository to clone (`default-url` if absent)  |
//! | `path`    | yes      | File path relative to the repository root      |
//! | `commit`  | no       | Revision to read at; excludes `branch`         |
//! | `branch`  | no       | Branch to read from (`default-branch` if both absent) |
//!
//! The payload is annotated with the commit hash and
//! `content-type: application/x-yaml`.

pub mod error;
pub mod fetcher;
pub mod params;
pub mod resolver;

pub use error::{GitError, Result};
pub use fetcher::{FetchedFile, Git2Fetcher, GitFetcher};
pub use params::GitParams;
pub use resolver::{
    ANNOTATION_KEY_COMMIT_HASH, GIT_RESOLVER_NAME, GitResolver, LABEL_VALUE_GIT_RESOLVER_TYPE,
    YAML_CONTENT_TYPE,
};
