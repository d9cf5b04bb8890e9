//! Classification of inbound JSON-RPC frames.

use serde_json::Value;

use super::connection::InboundFrame;

/// What an inbound frame turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Reply to one of our `logsSubscribe` requests.
    SubscriptionAck { id: Value, subscription: Value },
    /// Top-level JSON-RPC error object.
    RpcError { id: Value, error: Value },
    /// `logsNotification` payload. `signature` is `None` when absent or not a string.
    LogEvent {
        logs: Vec<String>,
        signature: Option<String>,
    },
    Unrecognized,
}

impl InboundMessage {
    pub fn classify(frame: &InboundFrame) -> Self {
        match frame {
            InboundFrame::Json(value) => Self::classify_value(value),
            InboundFrame::Text(_) => Self::Unrecognized,
        }
    }

    pub fn classify_value(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Self::Unrecognized;
        };

        let id = obj.get("id").cloned().unwrap_or(Value::Null);

        if let Some(error) = obj.get("error").filter(|e| !e.is_null()) {
            return Self::RpcError {
                id,
                error: error.clone(),
            };
        }

        if let Some(result) = obj.get("result") {
            return Self::SubscriptionAck {
                id,
                subscription: result.clone(),
            };
        }

        let Some(event) = value.pointer("/params/result/value") else {
            return Self::Unrecognized;
        };
        let Some(lines) = event.get("logs").and_then(Value::as_array) else {
            return Self::Unrecognized;
        };

        let logs = lines
            .iter()
            .filter_map(|line| line.as_str().map(str::to_string))
            .collect();
        let signature = event
            .get("signature")
            .and_then(Value::as_str)
            .map(str::to_string);

        Self::LogEvent { logs, signature }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_subscription_ack() {
        let msg = InboundMessage::classify_value(&json!({"jsonrpc": "2.0", "result": 4242, "id": "pump1"}));
        assert_eq!(
            msg,
            InboundMessage::SubscriptionAck {
                id: json!("pump1"),
                subscription: json!(4242),
            }
        );
    }

    #[test]
    fn test_rpc_error_wins_over_result() {
        let msg = InboundMessage::classify_value(&json!({
            "jsonrpc": "2.0",
            "id": "pump1",
            "result": null,
            "error": {"code": -32602, "message": "Invalid params"}
        }));
        assert!(matches!(msg, InboundMessage::RpcError { .. }));
    }

    #[test]
    fn test_log_notification() {
        let msg = InboundMessage::classify_value(&json!({
            "jsonrpc": "2.0",
            "method": "logsNotification",
            "params": {
                "subscription": 4242,
                "result": {
                    "context": {"slot": 1},
                    "value": {
                        "signature": "SIG123",
                        "err": null,
                        "logs": ["Program log: Instruction: CreatePool", 7]
                    }
                }
            }
        }));
        assert_eq!(
            msg,
            InboundMessage::LogEvent {
                logs: vec!["Program log: Instruction: CreatePool".to_string()],
                signature: Some("SIG123".to_string()),
            }
        );
    }

    #[test]
    fn test_non_string_signature_is_dropped() {
        let msg = InboundMessage::classify_value(&json!({
            "params": {"result": {"value": {"signature": 12, "logs": ["a"]}}}
        }));
        assert_eq!(
            msg,
            InboundMessage::LogEvent {
                logs: vec!["a".to_string()],
                signature: None,
            }
        );
    }

    #[test]
    fn test_unrecognized_shapes() {
        assert_eq!(
            InboundMessage::classify(&InboundFrame::Text("not json".to_string())),
            InboundMessage::Unrecognized
        );
        assert_eq!(InboundMessage::classify_value(&json!([1, 2])), InboundMessage::Unrecognized);
        assert_eq!(
            InboundMessage::classify_value(&json!({"params": {"result": {"value": {"logs": "x"}}}})),
            InboundMessage::Unrecognized
        );
    }
}
