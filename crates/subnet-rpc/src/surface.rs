//! The authenticated RPC surface between peers (§6). Only the envelope and
//! first-chunk-verification contract are implemented here — the actual
//! tensor/inference payload carried by `rpc_inference_stream` is out of
//! scope (Non-goal).

use futures::Stream;
use serde::{Deserialize, Serialize};
use subnet_core::domain::{RequestAuthInfo, ResponseAuthInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientMode {
    Validator,
    Miner,
    Relay,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    pub version: String,
    pub client_mode: ClientMode,
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfoRequest {
    pub auth: RequestAuthInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfoResponse {
    pub auth: ResponseAuthInfo,
    pub data: NodeData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MathRequest {
    pub auth: RequestAuthInfo,
    pub equation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MathResponse {
    pub auth: ResponseAuthInfo,
    pub output: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceStreamRequest {
    pub auth: RequestAuthInfo,
    pub prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceChunk {
    pub auth: ResponseAuthInfo,
    /// Tensor payload bytes; opaque to this crate.
    pub output: Vec<u8>,
}

/// The authenticated RPC surface a peer exposes. Implementations plug in
/// the actual tensor/inference backend; this crate only owns the
/// authentication envelope around it.
#[async_trait::async_trait]
pub trait RpcSurface: Send + Sync {
    async fn rpc_info(&self, req: InfoRequest) -> crate::error::Result<InfoResponse>;

    async fn rpc_math(&self, req: MathRequest) -> crate::error::Result<MathResponse>;

    fn rpc_inference_stream(
        &self,
        req: InferenceStreamRequest,
    ) -> crate::error::Result<Box<dyn Stream<Item = InferenceChunk> + Send + Unpin>>;
}
