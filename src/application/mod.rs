//! Application layer: request normalization, routing, aggregation,
//! sanitization, and the moderation use case that ties them together.

pub mod aggregate;
pub mod errors;
pub mod moderation;
pub mod normalize;
pub mod router;
pub mod sanitize;

pub use errors::GatewayError;
pub use moderation::ModerationUseCase;
pub use normalize::{NormalizedRequest, RawValidateRequest, normalize};
pub use router::{Plan, route};
