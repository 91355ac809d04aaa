use serde_json::Value;
use std::sync::Arc;

use crate::events::ServerEvent;
use crate::hub::{Hub, UserId};

/// Stateless relay for WebRTC call negotiation. Payloads pass through
/// verbatim, keyed on a presence lookup of the explicit target. An absent
/// target is an expected case, not an error: the event is dropped and the
/// caller's own timeout handles the silence. Call records are persisted
/// separately through the call endpoints, never here.
#[derive(Clone)]
pub struct SignalingRelay {
    hub: Arc<Hub>,
}

impl SignalingRelay {
    pub fn new(hub: Arc<Hub>) -> Self {
        SignalingRelay { hub }
    }

    pub async fn call_user(
        &self,
        target: UserId,
        signal_data: Value,
        from_user: Value,
        call_type: Option<String>,
    ) {
        self.forward(
            target,
            ServerEvent::CallIncoming {
                signal: signal_data,
                from: from_user,
                call_type: call_type.unwrap_or_else(|| "video".to_string()),
            },
        )
        .await;
    }

    pub async fn answer_call(&self, target: UserId, signal: Value) {
        self.forward(target, ServerEvent::CallAnswered { signal }).await;
    }

    pub async fn ice_candidate(&self, target: UserId, candidate: Value) {
        self.forward(target, ServerEvent::IceCandidate { candidate })
            .await;
    }

    pub async fn end_call(&self, target: UserId) {
        self.forward(target, ServerEvent::CallEnded).await;
    }

    async fn forward(&self, target: UserId, event: ServerEvent) {
        match self.hub.lookup(target).await {
            Some(connection) => connection.send(event),
            None => {
                tracing::debug!(user_id = target, "signaling target offline, dropping event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{drain, test_connection};
    use serde_json::json;

    #[tokio::test]
    async fn events_reach_the_target_connection_only() {
        let hub = Arc::new(Hub::new());
        let relay = SignalingRelay::new(hub.clone());

        let (alice, mut alice_rx) = test_connection(1);
        let (bob, mut bob_rx) = test_connection(2);
        hub.register(alice).await;
        hub.register(bob).await;
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        relay
            .call_user(2, json!({"sdp": "offer"}), json!({"id": 1}), None)
            .await;

        assert!(drain(&mut alice_rx).is_empty());
        assert_eq!(
            drain(&mut bob_rx),
            vec![ServerEvent::CallIncoming {
                signal: json!({"sdp": "offer"}),
                from: json!({"id": 1}),
                call_type: "video".to_string(),
            }]
        );

        relay.answer_call(1, json!({"sdp": "answer"})).await;
        assert_eq!(
            drain(&mut alice_rx),
            vec![ServerEvent::CallAnswered {
                signal: json!({"sdp": "answer"})
            }]
        );

        relay.ice_candidate(2, json!({"candidate": "c0"})).await;
        relay.end_call(2).await;
        assert_eq!(
            drain(&mut bob_rx),
            vec![
                ServerEvent::IceCandidate {
                    candidate: json!({"candidate": "c0"})
                },
                ServerEvent::CallEnded,
            ]
        );
    }

    #[tokio::test]
    async fn offline_target_drops_silently() {
        let hub = Arc::new(Hub::new());
        let relay = SignalingRelay::new(hub.clone());

        let (alice, mut alice_rx) = test_connection(1);
        hub.register(alice).await;
        drain(&mut alice_rx);

        // User 2 has no presence entry: nobody hears anything, including the
        // caller.
        relay
            .call_user(2, json!({"sdp": "offer"}), json!({"id": 1}), Some("audio".into()))
            .await;

        assert!(drain(&mut alice_rx).is_empty());
    }

    #[tokio::test]
    async fn custom_call_type_passes_through() {
        let hub = Arc::new(Hub::new());
        let relay = SignalingRelay::new(hub.clone());

        let (bob, mut bob_rx) = test_connection(2);
        hub.register(bob).await;
        drain(&mut bob_rx);

        relay
            .call_user(2, json!({}), json!({}), Some("audio".to_string()))
            .await;

        match &drain(&mut bob_rx)[..] {
            [ServerEvent::CallIncoming { call_type, .. }] => assert_eq!(call_type, "audio"),
            other => panic!("unexpected events: {:?}", other),
        }
    }
}
