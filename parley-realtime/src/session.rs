use std::sync::Arc;

use crate::delivery::DeliveryCoordinator;
use crate::events::ClientEvent;
use crate::hub::{ConnectionHandle, Hub};
use crate::signaling::SignalingRelay;

/// One authenticated connection's view of the realtime core. The transport
/// loop parses frames into [`ClientEvent`]s and feeds them here; dispatch is
/// an exhaustive match over the inbound vocabulary, so adding an event
/// without handling it is a compile error.
pub struct Session {
    pub connection: ConnectionHandle,
    hub: Arc<Hub>,
    coordinator: Arc<DeliveryCoordinator>,
    signaling: SignalingRelay,
}

impl Session {
    pub fn new(
        connection: ConnectionHandle,
        hub: Arc<Hub>,
        coordinator: Arc<DeliveryCoordinator>,
        signaling: SignalingRelay,
    ) -> Self {
        Session {
            connection,
            hub,
            coordinator,
            signaling,
        }
    }

    pub async fn dispatch(&self, event: ClientEvent) {
        match event {
            ClientEvent::ConversationJoin { conversation_id } => {
                self.hub.join(self.connection.id, conversation_id).await;
                tracing::debug!(
                    user_id = self.connection.user.id,
                    conversation_id,
                    "joined conversation channel"
                );
            }
            ClientEvent::ConversationLeave { conversation_id } => {
                self.hub.leave(self.connection.id, conversation_id).await;
            }
            ClientEvent::MessageSend {
                conversation_id,
                temp_id,
                content,
                kind,
                file_url,
            } => {
                self.coordinator
                    .handle_send(
                        &self.connection,
                        conversation_id,
                        temp_id,
                        content,
                        kind,
                        file_url,
                    )
                    .await;
            }
            ClientEvent::MessageDelivered {
                message_id,
                conversation_id,
            } => {
                self.coordinator
                    .handle_delivered(message_id, conversation_id)
                    .await;
            }
            ClientEvent::MessageSeen {
                conversation_id,
                last_seen_message_id,
            } => {
                self.coordinator
                    .handle_seen(&self.connection.user, conversation_id, last_seen_message_id)
                    .await;
            }
            ClientEvent::TypingStart { conversation_id } => {
                self.coordinator
                    .handle_typing(&self.connection, conversation_id, true)
                    .await;
            }
            ClientEvent::TypingStop { conversation_id } => {
                self.coordinator
                    .handle_typing(&self.connection, conversation_id, false)
                    .await;
            }
            ClientEvent::CallUser {
                user_to_call_id,
                signal_data,
                from_user,
                call_type,
            } => {
                self.signaling
                    .call_user(user_to_call_id, signal_data, from_user, call_type)
                    .await;
            }
            ClientEvent::AnswerCall { to, signal } => {
                self.signaling.answer_call(to, signal).await;
            }
            ClientEvent::IceCandidate { target, candidate } => {
                self.signaling.ice_candidate(target, candidate).await;
            }
            ClientEvent::EndCall { to } => {
                self.signaling.end_call(to).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ServerEvent;
    use crate::testing::{drain, test_connection, MemStore};
    use parley_core::models::MessageStatus;

    #[tokio::test]
    async fn dispatch_routes_join_send_and_signal() {
        let hub = Arc::new(Hub::new());
        let store = Arc::new(MemStore::new());
        store.set_participants(42, vec![1, 2]);
        let coordinator = Arc::new(DeliveryCoordinator::new(hub.clone(), store.clone()));
        let signaling = SignalingRelay::new(hub.clone());

        let (alice, mut alice_rx) = test_connection(1);
        let (bob, mut bob_rx) = test_connection(2);
        hub.register(alice.clone()).await;
        hub.register(bob.clone()).await;

        let alice_session = Session::new(
            alice,
            hub.clone(),
            coordinator.clone(),
            signaling.clone(),
        );
        let bob_session = Session::new(bob, hub.clone(), coordinator, signaling);

        alice_session
            .dispatch(serde_json::from_str(r#"{"event":"conv:join","data":{"conversationId":42}}"#).unwrap())
            .await;
        bob_session
            .dispatch(serde_json::from_str(r#"{"event":"conv:join","data":{"conversationId":42}}"#).unwrap())
            .await;
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        alice_session
            .dispatch(
                serde_json::from_str(
                    r#"{"event":"msg:send","data":{"conversationId":42,"tempId":"t1","content":"hi"}}"#,
                )
                .unwrap(),
            )
            .await;

        assert!(matches!(
            &drain(&mut alice_rx)[..],
            [ServerEvent::MessageSent {
                status: MessageStatus::Sent,
                ..
            }]
        ));
        assert_eq!(drain(&mut bob_rx).len(), 2);

        bob_session
            .dispatch(
                serde_json::from_str(
                    r#"{"event":"end_call","data":{"to":1}}"#,
                )
                .unwrap(),
            )
            .await;
        assert_eq!(drain(&mut alice_rx), vec![ServerEvent::CallEnded]);
    }
}
