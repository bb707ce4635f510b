//! JSON-RPC 2.0 clients for storage nodes and the indexer.
//!
//! Both clients are generic over a [`Transport`] that moves one JSON request
//! to a node and returns its JSON response. The HTTP client that implements
//! it in production lives outside this crate.

use std::{
    future::Future,
    sync::atomic::{AtomicU64, Ordering},
};

use alloy_primitives::B256;
use base64::{Engine, engine::general_purpose::STANDARD};
use bytes::Bytes;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};
use tracing::trace;

use crate::{
    error::NodeError,
    node::{
        FileInfo, Indexer, NodeAddress, NodeLocation, NodeRpc, SegmentWithProof, ShardConfig,
        ShardedNodes, Status,
    },
};

/// Moves a JSON request body to a node and returns the response body.
pub trait Transport: Send + Sync {
    /// POSTs `body` to `node`.
    fn post(
        &self,
        node: &NodeAddress,
        body: Value,
    ) -> impl Future<Output = Result<Value, NodeError>> + Send;
}

#[derive(Deserialize)]
struct Response {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// Shared request plumbing of both clients.
#[derive(Debug)]
struct Client<T> {
    transport: T,
    next_id: AtomicU64,
}

impl<T: Transport> Client<T> {
    const fn new(transport: T) -> Self {
        Self {
            transport,
            next_id: AtomicU64::new(1),
        }
    }

    /// Calls `method`, mapping a null result to `None`.
    async fn call<R: DeserializeOwned>(
        &self,
        node: &NodeAddress,
        method: &'static str,
        params: Value,
    ) -> Result<Option<R>, NodeError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        trace!(node = %node, method = method, id = id, "rpc request");

        let response = self.transport.post(node, body).await?;
        let response: Response =
            serde_json::from_value(response).map_err(|e| NodeError::decode(node, e))?;
        if let Some(err) = response.error {
            return Err(NodeError::from_rpc(node, err.code, err.message));
        }
        match response.result {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| NodeError::decode(node, e)),
        }
    }

    /// Calls `method`, treating a null result as an error.
    async fn call_required<R: DeserializeOwned>(
        &self,
        node: &NodeAddress,
        method: &'static str,
        params: Value,
    ) -> Result<R, NodeError> {
        self.call(node, method, params)
            .await?
            .ok_or_else(|| NodeError::EmptyResponse {
                node: node.clone(),
                method,
            })
    }
}

/// [`NodeRpc`] over JSON-RPC.
#[derive(Debug)]
pub struct JsonRpcNodes<T> {
    client: Client<T>,
}

impl<T: Transport> JsonRpcNodes<T> {
    /// Creates a client over `transport`.
    pub const fn new(transport: T) -> Self {
        Self {
            client: Client::new(transport),
        }
    }

    /// The underlying transport.
    pub const fn transport(&self) -> &T {
        &self.client.transport
    }
}

impl<T: Transport> NodeRpc for JsonRpcNodes<T> {
    async fn status(&self, node: &NodeAddress) -> Result<Status, NodeError> {
        self.client
            .call_required(node, "zgs_getStatus", json!([]))
            .await
    }

    async fn shard_config(&self, node: &NodeAddress) -> Result<ShardConfig, NodeError> {
        self.client
            .call_required(node, "zgs_getShardConfig", json!([]))
            .await
    }

    async fn file_info(
        &self,
        node: &NodeAddress,
        root: &B256,
        need_available: bool,
    ) -> Result<Option<FileInfo>, NodeError> {
        self.client
            .call(node, "zgs_getFileInfo", json!([root, need_available]))
            .await
    }

    async fn file_info_by_tx_seq(
        &self,
        node: &NodeAddress,
        tx_seq: u64,
    ) -> Result<Option<FileInfo>, NodeError> {
        self.client
            .call(node, "zgs_getFileInfoByTxSeq", json!([tx_seq]))
            .await
    }

    async fn upload_segments(
        &self,
        node: &NodeAddress,
        segments: &[SegmentWithProof],
    ) -> Result<(), NodeError> {
        let params = json!([segments]);
        self.client
            .call::<Value>(node, "zgs_uploadSegments", params)
            .await
            .map(drop)
    }

    async fn upload_segments_by_tx_seq(
        &self,
        node: &NodeAddress,
        segments: &[SegmentWithProof],
        tx_seq: u64,
    ) -> Result<(), NodeError> {
        let params = json!([segments, tx_seq]);
        self.client
            .call::<Value>(node, "zgs_uploadSegmentsByTxSeq", params)
            .await
            .map(drop)
    }

    async fn download_segment(
        &self,
        node: &NodeAddress,
        root: &B256,
        start_chunk: u64,
        end_chunk: u64,
    ) -> Result<Bytes, NodeError> {
        let params = json!([root, start_chunk, end_chunk]);
        let encoded: String = self
            .client
            .call_required(node, "zgs_downloadSegment", params)
            .await?;
        STANDARD
            .decode(encoded)
            .map(Bytes::from)
            .map_err(|e| NodeError::decode(node, e))
    }

    async fn download_segment_with_proof(
        &self,
        node: &NodeAddress,
        root: &B256,
        index: u64,
    ) -> Result<SegmentWithProof, NodeError> {
        let params = json!([root, index]);
        self.client
            .call_required(node, "zgs_downloadSegmentWithProof", params)
            .await
    }
}

/// [`Indexer`] over JSON-RPC.
#[derive(Debug)]
pub struct JsonRpcIndexer<T> {
    client: Client<T>,
    url: NodeAddress,
}

impl<T: Transport> JsonRpcIndexer<T> {
    /// Creates a client for the indexer at `url`.
    pub fn new(url: impl Into<NodeAddress>, transport: T) -> Self {
        Self {
            client: Client::new(transport),
            url: url.into(),
        }
    }
}

impl<T: Transport> Indexer for JsonRpcIndexer<T> {
    async fn sharded_nodes(&self) -> Result<ShardedNodes, NodeError> {
        self.client
            .call_required(&self.url, "indexer_getShardedNodes", json!([]))
            .await
    }

    async fn file_locations(&self, root: &B256) -> Result<Vec<NodeLocation>, NodeError> {
        let params = json!([root]);
        let locations = self
            .client
            .call(&self.url, "indexer_getFileLocations", params)
            .await?;
        Ok(locations.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use zgs_primitives::Proof;

    /// Replays canned responses and records requests.
    #[derive(Default)]
    struct Scripted {
        responses: Mutex<VecDeque<Result<Value, NodeError>>>,
        requests: Mutex<Vec<(NodeAddress, Value)>>,
    }

    impl Scripted {
        fn with(responses: impl IntoIterator<Item = Value>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().map(Ok).collect()),
                ..Default::default()
            }
        }

        fn last_request(&self) -> Value {
            self.requests
                .lock()
                .last()
                .map(|(_, body)| body.clone())
                .unwrap()
        }
    }

    impl Transport for Scripted {
        async fn post(&self, node: &NodeAddress, body: Value) -> Result<Value, NodeError> {
            self.requests.lock().push((node.clone(), body));
            self.responses.lock().pop_front().unwrap()
        }
    }

    fn node() -> NodeAddress {
        NodeAddress::from("http://node:5678")
    }

    fn root() -> B256 {
        B256::repeat_byte(0x42)
    }

    #[tokio::test]
    async fn test_request_envelope() {
        let rpc = JsonRpcNodes::new(Scripted::with([
            json!({"jsonrpc": "2.0", "id": 1, "result": {"shardId": 1, "numShard": 4}}),
            json!({"jsonrpc": "2.0", "id": 2, "result": null}),
        ]));

        let shard = rpc.shard_config(&node()).await.unwrap();
        assert_eq!(shard, ShardConfig::new(1, 4));
        let request = rpc.transport().last_request();
        assert_eq!(request["jsonrpc"], "2.0");
        assert_eq!(request["method"], "zgs_getShardConfig");
        assert_eq!(request["id"], 1);

        assert_eq!(rpc.file_info(&node(), &root(), true).await.unwrap(), None);
        let request = rpc.transport().last_request();
        assert_eq!(request["id"], 2);
        assert_eq!(request["params"], json!([format!("{}", root()), true]));
    }

    #[tokio::test]
    async fn test_error_mapping() {
        let rpc = JsonRpcNodes::new(Scripted::with([
            json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": {"code": -32000, "message": "too many data writing: 1000"}
            }),
            json!({
                "jsonrpc": "2.0",
                "id": 2,
                "error": {"code": -32602, "message": "invalid proof"}
            }),
            json!({"jsonrpc": "2.0", "id": 3, "result": null}),
            json!({"jsonrpc": "2.0", "id": 4, "result": {"unexpected": true}}),
        ]));

        let busy = rpc
            .upload_segments_by_tx_seq(&node(), &[], 0)
            .await
            .unwrap_err();
        assert!(matches!(busy, NodeError::Backpressure { .. }));

        let rejected = rpc.upload_segments(&node(), &[]).await.unwrap_err();
        let expected = NodeError::Rpc {
            node: node(),
            code: -32602,
            message: "invalid proof".into(),
        };
        assert_eq!(rejected, expected);

        let empty = rpc.status(&node()).await.unwrap_err();
        let expected = NodeError::EmptyResponse {
            node: node(),
            method: "zgs_getStatus",
        };
        assert_eq!(empty, expected);

        let malformed = rpc.shard_config(&node()).await.unwrap_err();
        assert!(matches!(malformed, NodeError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_upload_by_tx_seq_params() {
        let response = json!({"jsonrpc": "2.0", "id": 1, "result": null});
        let rpc = JsonRpcNodes::new(Scripted::with([response]));
        let segment = SegmentWithProof {
            root: root(),
            data: Bytes::from(vec![0u8; 256]),
            index: 0,
            proof: Proof::new(vec![root()], Vec::new()),
            file_size: 10,
        };
        rpc.upload_segments_by_tx_seq(&node(), std::slice::from_ref(&segment), 9)
            .await
            .unwrap();

        let request = rpc.transport().last_request();
        assert_eq!(request["method"], "zgs_uploadSegmentsByTxSeq");
        assert_eq!(request["params"][1], 9);
        assert_eq!(request["params"][0][0]["fileSize"], 10);
        assert_eq!(request["params"][0][0]["index"], 0);
    }

    #[tokio::test]
    async fn test_download_segment_base64() {
        let response = json!({"jsonrpc": "2.0", "id": 1, "result": "AAEC"});
        let rpc = JsonRpcNodes::new(Scripted::with([response]));
        let data = rpc.download_segment(&node(), &root(), 0, 1).await.unwrap();
        assert_eq!(data.as_ref(), &[0, 1, 2]);
        assert_eq!(rpc.transport().last_request()["params"][2], 1);
    }

    #[tokio::test]
    async fn test_transport_failure_passes_through() {
        let transport = Scripted::default();
        transport
            .responses
            .lock()
            .push_back(Err(NodeError::Refused { node: node() }));
        let rpc = JsonRpcNodes::new(transport);
        let err = rpc.status(&node()).await.unwrap_err();
        assert_eq!(err, NodeError::Refused { node: node() });
    }

    #[tokio::test]
    async fn test_indexer() {
        let indexer = JsonRpcIndexer::new(
            "https://indexer",
            Scripted::with([
                json!({"jsonrpc": "2.0", "id": 1, "result": {
                    "trusted": [{"url": "http://a", "shardConfig": {"shardId": 0, "numShard": 1}}],
                    "discovered": []
                }}),
                json!({"jsonrpc": "2.0", "id": 2, "result": null}),
            ]),
        );

        let nodes = indexer.sharded_nodes().await.unwrap();
        assert_eq!(nodes.trusted.len(), 1);
        let first = indexer.client.transport.requests.lock()[0].0.clone();
        assert_eq!(first, NodeAddress::from("https://indexer"));

        assert!(indexer.file_locations(&root()).await.unwrap().is_empty());
        let request = indexer.client.transport.last_request();
        assert_eq!(request["method"], "indexer_getFileLocations");
    }
}
