//! Feature descriptor provider port

use async_trait::async_trait;
use terra_domain::DescriptorSet;
use thiserror::Error;

/// The descriptor provider could not produce descriptors for an image
/// reference. Surfaces as `InvalidInput` at submission time.
#[derive(Debug, Error)]
#[error("descriptor resolution failed: {0}")]
pub struct DescriptorError(pub String);

/// Resolves an image reference into its extracted feature descriptors.
///
/// The extraction pipeline itself (vision models, EXIF parsing) is an
/// external collaborator; this port is its entire surface.
#[async_trait]
pub trait DescriptorProvider: Send + Sync {
    async fn resolve(&self, image_ref: &str) -> Result<DescriptorSet, DescriptorError>;
}
