//! Built-in connectivity probe.

use async_trait::async_trait;
use serde_json::{Value, json};

use tether_json_rpc::RequestParams;

use crate::capabilities::CapabilitySet;
use crate::error::TetherError;
use crate::features::{Feature, FeatureContext};
use crate::methods;

/// Answers `ping` with an empty object. Either side may register it.
pub struct PingFeature {
    capabilities: CapabilitySet,
}

impl PingFeature {
    pub fn new() -> Self {
        Self {
            capabilities: [methods::PING].into_iter().collect(),
        }
    }
}

impl Default for PingFeature {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Feature for PingFeature {
    fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    async fn handle_request(
        &self,
        _method: &str,
        _params: Option<RequestParams>,
        _cx: &FeatureContext,
    ) -> Result<Value, TetherError> {
        Ok(json!({}))
    }
}
