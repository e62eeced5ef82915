//! Authenticated RPC: request/response signing, nonce-based replay defense,
//! proof-of-stake gating, and the transparent auth wrapper in front of the
//! peer-to-peer RPC surface.

pub mod error;
pub mod nonce_store;
pub mod pos_authorizer;
pub mod signature_authorizer;
pub mod surface;
pub mod wrapper;

pub use error::{Result, RpcError};
pub use nonce_store::NonceStore;
pub use pos_authorizer::PosAuthorizer;
pub use signature_authorizer::SignatureAuthorizer;
pub use surface::{
    ClientMode, InferenceChunk, InferenceStreamRequest, InfoRequest, InfoResponse, MathRequest, MathResponse,
    NodeData, RpcSurface,
};
pub use wrapper::RpcAuthWrapper;
