// Host protocol surface
// Dispatches method calls by name to the bridge registry and reports failures
// as {code, message} payloads.

use crate::core::pose_bridge::{BridgeRegistry, StartOutcome};
use crate::core::result_channel::ResultStream;
use crate::models::image::ImageData;
use crate::models::pose::{BridgeError, BridgeResult, DetectionOptions, ErrorPayload};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

pub const START_METHOD: &str = "startPoseDetector";
pub const CLOSE_METHOD: &str = "closePoseDetector";
pub const DEFAULT_DETECTOR: &str = "default";

/// A method invocation from the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    pub method: String,
    #[serde(default)]
    pub arguments: Value,
}

impl MethodCall {
    pub fn new(method: impl Into<String>, arguments: Value) -> Self {
        Self {
            method: method.into(),
            arguments,
        }
    }
}

pub type MethodResult = Result<Value, ErrorPayload>;

fn default_detector() -> String {
    DEFAULT_DETECTOR.to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartArguments {
    #[serde(default = "default_detector")]
    name: String,
    image_data: ImageData,
    options: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct CloseArguments {
    #[serde(default = "default_detector")]
    name: String,
}

impl Default for CloseArguments {
    fn default() -> Self {
        Self {
            name: default_detector(),
        }
    }
}

pub struct MethodChannel {
    registry: Arc<BridgeRegistry>,
}

impl MethodChannel {
    pub fn new(registry: Arc<BridgeRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<BridgeRegistry> {
        &self.registry
    }

    /// Handle one method call
    pub async fn handle(&self, call: MethodCall) -> MethodResult {
        let result = match call.method.as_str() {
            START_METHOD => self.start(call.arguments).await,
            CLOSE_METHOD => self.close(call.arguments).await,
            other => Err(BridgeError::InvalidArgument(format!(
                "method not implemented: {}",
                other
            ))),
        };

        result.map_err(|e| {
            tracing::debug!("{} failed: {}", call.method, e);
            e.to_payload()
        })
    }

    async fn start(&self, arguments: Value) -> BridgeResult<Value> {
        let args: StartArguments = serde_json::from_value(arguments)
            .map_err(|e| BridgeError::InvalidArgument(format!("Invalid image data: {}", e)))?;

        let options = args
            .options
            .ok_or_else(|| BridgeError::InvalidArgument("Invalid options".to_string()))
            .and_then(DetectionOptions::from_value)?;

        let bridge = self.registry.get_or_create(&args.name).await;
        match bridge.start(args.image_data, options).await? {
            StartOutcome::Landmarks(set) => serde_json::to_value(&set)
                .map_err(|e| BridgeError::Inference(format!("Failed to encode result: {}", e))),
            StartOutcome::Accepted => Ok(Value::Null),
        }
    }

    async fn close(&self, arguments: Value) -> BridgeResult<Value> {
        let args: CloseArguments = if arguments.is_null() {
            CloseArguments::default()
        } else {
            serde_json::from_value(arguments)
                .map_err(|e| BridgeError::InvalidArgument(format!("Invalid arguments: {}", e)))?
        };

        if let Some(bridge) = self.registry.get(&args.name).await {
            bridge.close();
        }
        Ok(Value::Null)
    }

    /// Attach to a detector's event stream (creating the detector if needed)
    pub async fn listen(&self, name: &str) -> ResultStream {
        self.registry.get_or_create(name).await.subscribe()
    }

    /// Detach from a detector's event stream
    pub async fn cancel(&self, name: &str) {
        if let Some(bridge) = self.registry.get(name).await {
            bridge.unsubscribe();
        }
    }
}
