//! Configuration for the resolution framework and its resolvers.
//!
//! Two layers:
//! - [`FrameworkConfig`]: process-wide settings loaded from TOML (timeout
//!   budget, worker count, routing label, retry backoff).
//! - [`ResolverConfig`] / [`ConfigStore`]: the flat key/value blob each
//!   resolver reads its defaults from. Request parameters always win over
//!   these defaults.

pub mod duration;
pub mod error;
pub mod framework;
pub mod resolver;

pub use duration::{format_duration, parse_duration};
pub use error::{ConfigError, Result};
pub use framework::{DEFAULT_RESOLVER_TYPE_LABEL, FrameworkConfig};
pub use resolver::{ConfigStore, KEY_FETCH_TIMEOUT, ResolverConfig};
