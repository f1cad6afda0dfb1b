//! Tekton Hub catalog resolver.
//!
//! Records labelled `resolution.tekton.dev/type: hub` are resolved by an
//! HTTP GET against the hub API. The response's `data.yaml` field becomes
//! the payload; no annotations are attached.
//!
//! | Parameter | Required | Default                                    |
//! |-----------|----------|--------------------------------------------|
//! | `catalog` | no       | `default-catalog` config, then `Tekton`    |
//! | `kind`    | yes      | `default-kind` config; `task` or `pipeline` |
//! | `name`    | yes      |                                            |
//! | `version` | yes      |                                            |
//!
//! The `fetch-timeout` config key overrides the resolution budget.

pub mod error;
pub mod params;
pub mod resolver;

pub use error::{HubError, Result};
pub use params::{DEFAULT_CATALOG, HubParams};
pub use resolver::{
    DEFAULT_API_BASE, HUB_RESOLVER_NAME, HubResolver, LABEL_VALUE_HUB_RESOLVER_TYPE,
};
