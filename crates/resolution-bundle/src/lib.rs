//! Tekton OCI bundle resolver.
//!
//! Records labelled `resolution.tekton.dev/type: bundle` name an image
//! whose layers each hold one Tekton object. The resolver pulls the image
//! manifest, picks the layer annotated with the requested kind and name,
//! and returns the first file of that layer's tar archive.
//!
//! | Parameter        | Required | Default                             |
//! |------------------|----------|-------------------------------------|
//! | `bundle`         | yes      |                                     |
//! | `name`           | yes      |                                     |
//! | `kind`           | yes      | `default-kind` config               |
//! | `serviceAccount` | yes      | `default-service-account` config    |
//!
//! Resolved payloads carry the layer's `dev.tekton.image.kind`,
//! `dev.tekton.image.name` and `dev.tekton.image.apiVersion` annotations.
//! Pull credentials come from a [`Keychain`]: anonymous by default, or the
//! service account's image pull secrets when the resolver is given a kube
//! client.

pub mod error;
pub mod keychain;
pub mod layer;
pub mod params;
pub mod reference;
pub mod registry;
pub mod resolver;

pub use error::{BundleError, Result};
pub use keychain::{Anonymous, Credentials, DockerConfig, Keychain, ServiceAccountKeychain, StaticKeychain};
pub use layer::{
    BUNDLE_ANNOTATION_API_VERSION, BUNDLE_ANNOTATION_KIND, BUNDLE_ANNOTATION_NAME, LayerContent,
    MAX_LAYER_BYTES, extract, select_layer,
};
pub use params::BundleParams;
pub use reference::ImageReference;
pub use registry::{Descriptor, HttpRegistryClient, Manifest, RegistryClient};
pub use resolver::{BUNDLE_RESOLVER_NAME, BundleResolver, LABEL_VALUE_BUNDLE_RESOLVER_TYPE};
