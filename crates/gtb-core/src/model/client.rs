use async_trait::async_trait;

use super::types::{GenerateOutcome, GenerateRequest, InvocationError};

/// Hexagonal port for the generative AI service.
///
/// Implementations own transport-level concerns (timeouts, auth) and must
/// translate their failures into the structured [`InvocationError`]
/// classification; string-sniffing of provider messages belongs behind this
/// boundary, never in the pipeline.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn generate(
        &self,
        req: GenerateRequest,
    ) -> std::result::Result<GenerateOutcome, InvocationError>;
}
