//! Static table of watched programs and the `logsSubscribe` frames built from it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One watched program. `instruction` is the text searched for in each log line.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Subscription {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Account passed as the `mentions` filter.
    pub program: String,
    pub instruction: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Read-only after startup. Cloned into the dispatcher.
#[derive(Debug, Clone)]
pub struct SubscriptionRegistry {
    subscriptions: Vec<Subscription>,
    commitment: String,
}

impl SubscriptionRegistry {
    pub fn new(subscriptions: Vec<Subscription>, commitment: impl Into<String>) -> Self {
        Self {
            subscriptions,
            commitment: commitment.into(),
        }
    }

    pub fn enabled(&self) -> impl Iterator<Item = &Subscription> {
        self.subscriptions.iter().filter(|s| s.enabled)
    }

    pub fn enabled_count(&self) -> usize {
        self.enabled().count()
    }

    /// Match criteria of every enabled subscription.
    pub fn match_texts(&self) -> Vec<&str> {
        self.enabled().map(|s| s.instruction.as_str()).collect()
    }

    /// True when any enabled match text appears in any log line.
    pub fn matches(&self, logs: &[String]) -> bool {
        self.enabled()
            .any(|sub| logs.iter().any(|line| line.contains(sub.instruction.as_str())))
    }

    /// One outbound `logsSubscribe` request per enabled subscription.
    /// Must be re-sent on every (re)connection.
    pub fn build_subscribe_requests(&self) -> Vec<Value> {
        self.enabled()
            .map(|sub| {
                serde_json::json!({
                    "jsonrpc": "2.0",
                    "id": sub.id,
                    "method": "logsSubscribe",
                    "params": [
                        { "mentions": [sub.program] },
                        { "commitment": self.commitment },
                    ],
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub(id: &str, instruction: &str, enabled: bool) -> Subscription {
        Subscription {
            id: id.to_string(),
            name: id.to_string(),
            program: format!("{id}-program"),
            instruction: instruction.to_string(),
            enabled,
        }
    }

    #[test]
    fn test_only_enabled_subscriptions_build_requests() {
        let registry = SubscriptionRegistry::new(
            vec![
                sub("pump1", "Instruction: CreatePool", true),
                sub("rad1", "initialize2", false),
                sub("other", "Instruction: Initialize", true),
            ],
            "processed",
        );

        let requests = registry.build_subscribe_requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0]["jsonrpc"], "2.0");
        assert_eq!(requests[0]["id"], "pump1");
        assert_eq!(requests[0]["method"], "logsSubscribe");
        assert_eq!(requests[0]["params"][0]["mentions"][0], "pump1-program");
        assert_eq!(requests[0]["params"][1]["commitment"], "processed");
        assert_eq!(requests[1]["id"], "other");
    }

    #[test]
    fn test_matches_any_enabled_text_in_any_line() {
        let registry = SubscriptionRegistry::new(
            vec![
                sub("pump1", "Instruction: CreatePool", true),
                sub("rad1", "initialize2", false),
            ],
            "processed",
        );

        let hit = vec![
            "Program log: Instruction: Buy".to_string(),
            "Program log: Instruction: CreatePool".to_string(),
        ];
        assert!(registry.matches(&hit));

        // disabled subscription text does not count
        let disabled_only = vec!["Program log: initialize2: InitializeInstruction2".to_string()];
        assert!(!registry.matches(&disabled_only));

        assert!(!registry.matches(&[]));
        assert_eq!(registry.match_texts(), vec!["Instruction: CreatePool"]);
    }
}
