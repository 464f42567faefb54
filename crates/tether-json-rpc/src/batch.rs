//! Batch decoding and processing with per-item failure isolation.

use std::future::Future;

use crate::error::JsonRpcError;
use crate::notification::JsonRpcNotification;
use crate::request::JsonRpcRequest;
use crate::response::JsonRpcMessage;

/// One position in a decoded request batch.
///
/// Items that failed structural validation are retained as `Invalid` markers
/// so the processor can still emit a matching error response for that
/// position instead of failing the whole batch.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchItem {
    Request(JsonRpcRequest),
    Notification(JsonRpcNotification),
    Invalid(JsonRpcError),
}

/// An ordered, non-empty sequence of inbound calls
#[derive(Debug, Clone, PartialEq)]
pub struct RequestBatch {
    items: Vec<BatchItem>,
}

impl RequestBatch {
    pub(crate) fn from_items(items: Vec<BatchItem>) -> Self {
        debug_assert!(!items.is_empty());
        Self { items }
    }

    pub fn items(&self) -> &[BatchItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of items that will produce a response (everything but notifications)
    pub fn expected_responses(&self) -> usize {
        self.items
            .iter()
            .filter(|item| !matches!(item, BatchItem::Notification(_)))
            .count()
    }
}

/// An ordered, non-empty sequence of inbound responses
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseBatch {
    pub messages: Vec<JsonRpcMessage>,
}

/// A well-formed call handed to the batch processor
#[derive(Debug, Clone, PartialEq)]
pub enum BatchCall {
    Request(JsonRpcRequest),
    Notification(JsonRpcNotification),
}

/// Process a request batch through `processor`, preserving item order.
///
/// Requests collect the processor's response; notifications run for their
/// side effect only and never contribute to the output; invalid-item markers
/// synthesize an invalid-request error response at their logical position.
/// The output length therefore equals the number of non-notification items,
/// which may be shorter than the input batch.
pub async fn process_requests<F, Fut>(batch: RequestBatch, mut processor: F) -> Vec<JsonRpcMessage>
where
    F: FnMut(BatchCall) -> Fut,
    Fut: Future<Output = Option<JsonRpcMessage>>,
{
    let mut responses = Vec::with_capacity(batch.expected_responses());

    for item in batch.items {
        match item {
            BatchItem::Request(request) => {
                let id = request.id;
                let response = processor(BatchCall::Request(request)).await.unwrap_or_else(|| {
                    JsonRpcMessage::error(JsonRpcError::internal_error(
                        Some(id),
                        Some("processor produced no response".to_string()),
                    ))
                });
                responses.push(response);
            }
            BatchItem::Notification(notification) => {
                // Side effect only; a notification never produces a response
                let _ = processor(BatchCall::Notification(notification)).await;
            }
            BatchItem::Invalid(error) => {
                responses.push(JsonRpcMessage::Error(error));
            }
        }
    }

    responses
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{IncomingMessage, decode_message};
    use crate::response::ResponseResult;
    use crate::types::RequestId;
    use serde_json::json;

    fn decode_batch(bytes: &[u8]) -> RequestBatch {
        match decode_message(bytes).unwrap() {
            IncomingMessage::RequestBatch(batch) => batch,
            other => panic!("expected request batch, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_mixed_batch_yields_two_responses() {
        let batch = decode_batch(
            br#"[
                {"jsonrpc":"2.0","method":"echo","id":1},
                {"jsonrpc":"2.0","method":"notifications/log"},
                {"bogus":true}
            ]"#,
        );

        let responses = process_requests(batch, |call| async move {
            match call {
                BatchCall::Request(request) => Some(JsonRpcMessage::success(
                    request.id,
                    ResponseResult::Success(json!({"echo": request.method})),
                )),
                BatchCall::Notification(_) => None,
            }
        })
        .await;

        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].id(), Some(RequestId(1)));
        assert!(!responses[0].is_error());
        match &responses[1] {
            JsonRpcMessage::Error(err) => {
                assert_eq!(err.error.code, crate::error_codes::INVALID_REQUEST)
            }
            other => panic!("expected synthesized error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_notification_only_batch_is_silent() {
        let batch = decode_batch(
            br#"[
                {"jsonrpc":"2.0","method":"notifications/progress"},
                {"jsonrpc":"2.0","method":"notifications/log"}
            ]"#,
        );

        let mut seen = 0;
        let responses = process_requests(batch, |call| {
            if matches!(call, BatchCall::Notification(_)) {
                seen += 1;
            }
            async { None }
        })
        .await;

        assert!(responses.is_empty());
        assert_eq!(seen, 2);
    }

    #[tokio::test]
    async fn test_one_failing_item_does_not_poison_siblings() {
        let batch = decode_batch(
            br#"[
                {"jsonrpc":"2.0","method":"ok","id":1},
                {"jsonrpc":"2.0","method":"boom","id":2},
                {"jsonrpc":"2.0","method":"ok","id":3}
            ]"#,
        );

        let responses = process_requests(batch, |call| async move {
            match call {
                BatchCall::Request(request) if request.method == "boom" => {
                    Some(JsonRpcMessage::error(JsonRpcError::internal_error(
                        Some(request.id),
                        Some("handler failure".into()),
                    )))
                }
                BatchCall::Request(request) => Some(JsonRpcMessage::success(
                    request.id,
                    ResponseResult::null(),
                )),
                BatchCall::Notification(_) => None,
            }
        })
        .await;

        assert_eq!(responses.len(), 3);
        assert!(!responses[0].is_error());
        assert!(responses[1].is_error());
        assert!(!responses[2].is_error());
    }
}
