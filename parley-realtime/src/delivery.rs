use std::sync::Arc;

use parley_core::models::{MessageKind, MessageStatus, NewMessage};
use parley_core::{DeliveryStore, StoreError};

use crate::events::ServerEvent;
use crate::hub::{ConnectionHandle, Hub, SessionUser, UserId};

/// Drives each message through persist -> ack -> fan-out and advances the
/// sent/delivered/read state machine. Per-conversation events go out in the
/// order persistence completes; nothing is ordered across conversations.
pub struct DeliveryCoordinator {
    hub: Arc<Hub>,
    store: Arc<dyn DeliveryStore>,
}

impl DeliveryCoordinator {
    pub fn new(hub: Arc<Hub>, store: Arc<dyn DeliveryStore>) -> Self {
        DeliveryCoordinator { hub, store }
    }

    /// Inbound `msg:send`. On success the sender gets exactly one ack carrying
    /// the correlation token, the room gets one broadcast (sender excluded),
    /// and every other participant gets one notification whether or not they
    /// are joined to the room. On persistence failure only the sender hears
    /// about it.
    pub async fn handle_send(
        &self,
        sender: &ConnectionHandle,
        conversation_id: i64,
        temp_id: String,
        content: Option<String>,
        kind: MessageKind,
        file_url: Option<String>,
    ) {
        let new = match normalize(conversation_id, sender.user.id, content, kind, file_url) {
            Ok(new) => new,
            Err(reason) => {
                sender.send(ServerEvent::MessageError {
                    temp_id,
                    error: reason.to_string(),
                });
                return;
            }
        };

        let record = match self.store.create_message(new).await {
            Ok(record) => record,
            Err(e) => {
                tracing::error!(conversation_id, error = %e, "failed to persist message");
                sender.send(ServerEvent::MessageError {
                    temp_id,
                    error: "Failed to send".to_string(),
                });
                return;
            }
        };

        sender.send(ServerEvent::MessageSent {
            temp_id,
            message_id: record.id,
            status: record.status,
            message: record.clone(),
        });

        self.hub
            .broadcast_to_conversation(
                conversation_id,
                ServerEvent::NewMessage(record.clone()),
                Some(sender.id),
            )
            .await;

        match self.store.conversation_participants(conversation_id).await {
            Ok(participants) => {
                for participant in participants {
                    if participant != sender.user.id {
                        self.hub
                            .notify_user(
                                participant,
                                ServerEvent::NewMessageNotification(record.clone()),
                            )
                            .await;
                    }
                }
            }
            Err(e) => {
                tracing::error!(conversation_id, error = %e, "failed to load participants for notification");
            }
        }
    }

    /// Inbound `msg:delivered`. Only the `sent -> delivered` transition is
    /// meaningful; a signal for an already delivered or read message changes
    /// nothing and is not re-broadcast.
    pub async fn handle_delivered(&self, message_id: i64, conversation_id: i64) {
        let advanced = match self
            .store
            .advance_message_status(message_id, MessageStatus::Delivered)
            .await
        {
            Ok(advanced) => advanced,
            Err(e) => {
                tracing::error!(message_id, error = %e, "failed to mark message delivered");
                return;
            }
        };

        if advanced == 0 {
            return;
        }

        self.hub
            .broadcast_to_conversation(
                conversation_id,
                ServerEvent::MessageStatusUpdate {
                    message_id,
                    status: MessageStatus::Delivered,
                    conversation_id,
                },
                None,
            )
            .await;
    }

    /// Inbound `msg:seen`. Bulk-marks everything authored by other senders as
    /// read, then tells the whole room who read up to where, so viewers can
    /// update receipts without refetching.
    pub async fn handle_seen(
        &self,
        reader: &SessionUser,
        conversation_id: i64,
        last_seen_message_id: i64,
    ) {
        if let Err(e) = self
            .store
            .mark_conversation_read(conversation_id, reader.id)
            .await
        {
            tracing::error!(conversation_id, error = %e, "failed to mark conversation read");
            return;
        }

        self.hub
            .broadcast_to_conversation(
                conversation_id,
                ServerEvent::MessageSeenUpdate {
                    conversation_id,
                    reader_id: reader.id,
                    last_seen_message_id,
                },
                None,
            )
            .await;
    }

    /// Typing indicators are pure pass-through: no persistence, sender
    /// excluded from its own echo.
    pub async fn handle_typing(&self, sender: &ConnectionHandle, conversation_id: i64, start: bool) {
        let event = if start {
            ServerEvent::TypingStart {
                user_id: sender.user.id,
                conversation_id,
            }
        } else {
            ServerEvent::TypingStop {
                user_id: sender.user.id,
                conversation_id,
            }
        };
        self.hub
            .broadcast_to_conversation(conversation_id, event, Some(sender.id))
            .await;
    }

    /// HTTP-originated send: same persist-and-fan-out, but there is no
    /// sending connection to ack or exclude.
    pub async fn send_from_api(
        &self,
        sender_id: UserId,
        conversation_id: i64,
        content: Option<String>,
        kind: MessageKind,
        file_url: Option<String>,
    ) -> Result<parley_core::models::MessageRecord, StoreError> {
        let new = normalize(conversation_id, sender_id, content, kind, file_url)
            .map_err(|reason| StoreError::Internal(reason.to_string()))?;
        let record = self.store.create_message(new).await?;

        self.hub
            .broadcast_to_conversation(conversation_id, ServerEvent::NewMessage(record.clone()), None)
            .await;

        let participants = self.store.conversation_participants(conversation_id).await?;
        for participant in participants {
            if participant != sender_id {
                self.hub
                    .notify_user(
                        participant,
                        ServerEvent::NewMessageNotification(record.clone()),
                    )
                    .await;
            }
        }

        Ok(record)
    }

    /// Deleting a message is restricted to its original sender; everyone in
    /// the room is told to evict it.
    pub async fn delete_message(
        &self,
        requester_id: UserId,
        message_id: i64,
    ) -> Result<(), StoreError> {
        let message = self
            .store
            .message_by_id(message_id)
            .await?
            .ok_or(StoreError::NotFound("message"))?;

        if message.sender_id != requester_id {
            return Err(StoreError::Forbidden);
        }

        self.store.delete_message(message_id).await?;

        self.hub
            .broadcast_to_conversation(
                message.conversation_id,
                ServerEvent::MessageDeleted { message_id },
                None,
            )
            .await;

        Ok(())
    }

    pub async fn remove_conversation(&self, conversation_id: i64) -> Result<(), StoreError> {
        self.store.delete_conversation(conversation_id).await?;
        self.hub
            .broadcast_to_conversation(
                conversation_id,
                ServerEvent::ConversationRemoved { conversation_id },
                None,
            )
            .await;
        Ok(())
    }

    pub async fn clear_conversation(&self, conversation_id: i64) -> Result<usize, StoreError> {
        let cleared = self.store.clear_conversation(conversation_id).await?;
        self.hub
            .broadcast_to_conversation(conversation_id, ServerEvent::ConversationCleared, None)
            .await;
        Ok(cleared)
    }
}

/// Exactly one of content / file reference survives, picked by kind. Clients
/// sometimes put a file URL in `content`; accept either slot.
fn normalize(
    conversation_id: i64,
    sender_id: UserId,
    content: Option<String>,
    kind: MessageKind,
    file_url: Option<String>,
) -> Result<NewMessage, &'static str> {
    let (content, file_url) = if kind.is_file_bearing() {
        let url = file_url.or(content);
        if url.is_none() {
            return Err("file message is missing its file reference");
        }
        (None, url)
    } else {
        if content.as_deref().map_or(true, |c| c.is_empty()) {
            return Err("message content required");
        }
        (content, None)
    };

    Ok(NewMessage {
        conversation_id,
        sender_id,
        content,
        kind,
        file_url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{drain, test_connection, MemStore};

    fn setup() -> (Arc<Hub>, Arc<MemStore>, DeliveryCoordinator) {
        let hub = Arc::new(Hub::new());
        let store = Arc::new(MemStore::new());
        let coordinator = DeliveryCoordinator::new(hub.clone(), store.clone());
        (hub, store, coordinator)
    }

    #[tokio::test]
    async fn send_acks_broadcasts_and_notifies() {
        let (hub, store, coordinator) = setup();
        store.set_participants(42, vec![1, 2]);

        let (alice, mut alice_rx) = test_connection(1);
        let (bob, mut bob_rx) = test_connection(2);
        hub.register(alice.clone()).await;
        hub.register(bob.clone()).await;
        hub.join(alice.id, 42).await;
        hub.join(bob.id, 42).await;
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        coordinator
            .handle_send(
                &alice,
                42,
                "t1".to_string(),
                Some("hi".to_string()),
                MessageKind::Text,
                None,
            )
            .await;

        // Sender: exactly the ack, no room echo, no self-notification.
        let alice_events = drain(&mut alice_rx);
        assert_eq!(alice_events.len(), 1);
        match &alice_events[0] {
            ServerEvent::MessageSent {
                temp_id,
                message_id,
                message,
                status,
            } => {
                assert_eq!(temp_id, "t1");
                assert_eq!(*message_id, message.id);
                assert_eq!(*status, MessageStatus::Sent);
                assert_eq!(message.content.as_deref(), Some("hi"));
            }
            other => panic!("expected ack, got {:?}", other),
        }

        // Recipient: one room broadcast plus one user-channel notification.
        let bob_events = drain(&mut bob_rx);
        assert_eq!(bob_events.len(), 2);
        assert!(matches!(bob_events[0], ServerEvent::NewMessage(_)));
        assert!(matches!(
            bob_events[1],
            ServerEvent::NewMessageNotification(_)
        ));
    }

    #[tokio::test]
    async fn send_notifies_participants_outside_the_room() {
        let (hub, store, coordinator) = setup();
        store.set_participants(42, vec![1, 2]);

        let (alice, mut alice_rx) = test_connection(1);
        let (bob, mut bob_rx) = test_connection(2);
        hub.register(alice.clone()).await;
        hub.register(bob.clone()).await;
        // Bob is online but has not joined the conversation channel.
        hub.join(alice.id, 42).await;
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        coordinator
            .handle_send(
                &alice,
                42,
                "t2".to_string(),
                Some("you there?".to_string()),
                MessageKind::Text,
                None,
            )
            .await;

        let bob_events = drain(&mut bob_rx);
        assert_eq!(bob_events.len(), 1);
        assert!(matches!(
            bob_events[0],
            ServerEvent::NewMessageNotification(_)
        ));
    }

    #[tokio::test]
    async fn failed_persist_surfaces_error_ack_only() {
        let (hub, store, coordinator) = setup();
        store.set_participants(42, vec![1, 2]);
        store.fail_creates(true);

        let (alice, mut alice_rx) = test_connection(1);
        let (bob, mut bob_rx) = test_connection(2);
        hub.register(alice.clone()).await;
        hub.register(bob.clone()).await;
        hub.join(alice.id, 42).await;
        hub.join(bob.id, 42).await;
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        coordinator
            .handle_send(
                &alice,
                42,
                "t3".to_string(),
                Some("hi".to_string()),
                MessageKind::Text,
                None,
            )
            .await;

        let alice_events = drain(&mut alice_rx);
        assert_eq!(
            alice_events,
            vec![ServerEvent::MessageError {
                temp_id: "t3".to_string(),
                error: "Failed to send".to_string(),
            }]
        );
        assert!(drain(&mut bob_rx).is_empty());
        assert_eq!(store.message_count(), 0);
    }

    #[tokio::test]
    async fn file_message_carries_url_not_content() {
        let (hub, store, coordinator) = setup();
        store.set_participants(7, vec![1]);

        let (alice, mut alice_rx) = test_connection(1);
        hub.register(alice.clone()).await;
        drain(&mut alice_rx);

        coordinator
            .handle_send(
                &alice,
                7,
                "t4".to_string(),
                Some("/uploads/cat.png".to_string()),
                MessageKind::Image,
                None,
            )
            .await;

        let events = drain(&mut alice_rx);
        match &events[0] {
            ServerEvent::MessageSent { message, .. } => {
                assert_eq!(message.content, None);
                assert_eq!(message.file_url.as_deref(), Some("/uploads/cat.png"));
            }
            other => panic!("expected ack, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn delivered_is_broadcast_once_and_never_regresses() {
        let (hub, store, coordinator) = setup();
        store.set_participants(42, vec![1, 2]);

        let (alice, mut alice_rx) = test_connection(1);
        hub.register(alice.clone()).await;
        hub.join(alice.id, 42).await;
        drain(&mut alice_rx);

        coordinator
            .handle_send(
                &alice,
                42,
                "t1".to_string(),
                Some("hi".to_string()),
                MessageKind::Text,
                None,
            )
            .await;
        drain(&mut alice_rx);
        let message_id = store.message(1).map(|m| m.id).unwrap();

        coordinator.handle_delivered(message_id, 42).await;
        let events = drain(&mut alice_rx);
        assert_eq!(
            events,
            vec![ServerEvent::MessageStatusUpdate {
                message_id,
                status: MessageStatus::Delivered,
                conversation_id: 42,
            }]
        );

        // A duplicate delivered signal is a no-op.
        coordinator.handle_delivered(message_id, 42).await;
        assert!(drain(&mut alice_rx).is_empty());

        // And a delivered signal after read must not regress the status.
        store
            .advance_message_status(message_id, MessageStatus::Read)
            .await
            .unwrap();
        coordinator.handle_delivered(message_id, 42).await;
        assert!(drain(&mut alice_rx).is_empty());
        assert_eq!(store.message(message_id).unwrap().status, MessageStatus::Read);
    }

    #[tokio::test]
    async fn seen_marks_only_messages_from_other_senders() {
        let (hub, store, coordinator) = setup();
        store.set_participants(42, vec![1, 2]);

        let (alice, mut alice_rx) = test_connection(1);
        let (bob, mut bob_rx) = test_connection(2);
        hub.register(alice.clone()).await;
        hub.register(bob.clone()).await;
        hub.join(alice.id, 42).await;
        hub.join(bob.id, 42).await;

        coordinator
            .handle_send(&alice, 42, "a1".into(), Some("from alice".into()), MessageKind::Text, None)
            .await;
        coordinator
            .handle_send(&bob, 42, "b1".into(), Some("from bob".into()), MessageKind::Text, None)
            .await;
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        // Bob reads the conversation: only Alice's message flips to read.
        coordinator.handle_seen(&bob.user, 42, 2).await;

        assert_eq!(store.message(1).unwrap().status, MessageStatus::Read);
        assert!(store.message(1).unwrap().is_read);
        assert_eq!(store.message(2).unwrap().status, MessageStatus::Sent);

        let events = drain(&mut alice_rx);
        assert_eq!(
            events,
            vec![ServerEvent::MessageSeenUpdate {
                conversation_id: 42,
                reader_id: 2,
                last_seen_message_id: 2,
            }]
        );
    }

    #[tokio::test]
    async fn delete_requires_sender_identity() {
        let (hub, store, coordinator) = setup();
        store.set_participants(42, vec![1, 2]);

        let (alice, mut alice_rx) = test_connection(1);
        hub.register(alice.clone()).await;
        hub.join(alice.id, 42).await;

        coordinator
            .handle_send(&alice, 42, "t1".into(), Some("hi".into()), MessageKind::Text, None)
            .await;
        drain(&mut alice_rx);

        // Bob did not author message 1.
        let result = coordinator.delete_message(2, 1).await;
        assert!(matches!(result, Err(StoreError::Forbidden)));
        assert!(store.message(1).is_some());
        assert!(drain(&mut alice_rx).is_empty());

        coordinator.delete_message(1, 1).await.unwrap();
        assert!(store.message(1).is_none());
        assert_eq!(
            drain(&mut alice_rx),
            vec![ServerEvent::MessageDeleted { message_id: 1 }]
        );
    }

    #[tokio::test]
    async fn conversation_removal_and_clear_broadcast_evictions() {
        let (hub, store, coordinator) = setup();
        store.set_participants(42, vec![1, 2]);

        let (alice, mut alice_rx) = test_connection(1);
        hub.register(alice.clone()).await;
        hub.join(alice.id, 42).await;
        coordinator
            .handle_send(&alice, 42, "t1".into(), Some("hi".into()), MessageKind::Text, None)
            .await;
        drain(&mut alice_rx);

        let cleared = coordinator.clear_conversation(42).await.unwrap();
        assert_eq!(cleared, 1);
        assert_eq!(drain(&mut alice_rx), vec![ServerEvent::ConversationCleared]);

        coordinator.remove_conversation(42).await.unwrap();
        assert_eq!(
            drain(&mut alice_rx),
            vec![ServerEvent::ConversationRemoved {
                conversation_id: 42
            }]
        );
    }

    /// The full two-party exchange: send, receive, delivery receipt, read
    /// receipt, with message ids starting where the fixture pins them.
    #[tokio::test]
    async fn two_party_message_lifecycle() {
        let (hub, store, coordinator) = setup();
        store.set_participants(42, vec![1, 2]);
        store.set_next_message_id(501);

        let (alice, mut alice_rx) = test_connection(1);
        let (bob, mut bob_rx) = test_connection(2);
        hub.register(alice.clone()).await;
        hub.register(bob.clone()).await;
        hub.join(alice.id, 42).await;
        hub.join(bob.id, 42).await;
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        coordinator
            .handle_send(
                &alice,
                42,
                "t1".to_string(),
                Some("hi".to_string()),
                MessageKind::Text,
                None,
            )
            .await;

        let alice_events = drain(&mut alice_rx);
        assert!(matches!(
            &alice_events[..],
            [ServerEvent::MessageSent {
                message_id: 501,
                status: MessageStatus::Sent,
                ..
            }]
        ));

        let bob_events = drain(&mut bob_rx);
        assert!(
            matches!(&bob_events[0], ServerEvent::NewMessage(record) if record.id == 501)
        );
        assert!(matches!(
            &bob_events[1],
            ServerEvent::NewMessageNotification(record) if record.id == 501
        ));

        coordinator.handle_delivered(501, 42).await;
        let expected_update = ServerEvent::MessageStatusUpdate {
            message_id: 501,
            status: MessageStatus::Delivered,
            conversation_id: 42,
        };
        assert_eq!(drain(&mut alice_rx), vec![expected_update.clone()]);
        assert_eq!(drain(&mut bob_rx), vec![expected_update]);

        coordinator.handle_seen(&bob.user, 42, 501).await;
        let expected_seen = ServerEvent::MessageSeenUpdate {
            conversation_id: 42,
            reader_id: 2,
            last_seen_message_id: 501,
        };
        assert_eq!(drain(&mut alice_rx), vec![expected_seen.clone()]);
        assert_eq!(drain(&mut bob_rx), vec![expected_seen]);

        let message = store.message(501).unwrap();
        assert_eq!(message.status, MessageStatus::Read);
        assert!(message.is_read);
    }

    #[tokio::test]
    async fn typing_indicators_skip_the_sender() {
        let (hub, _store, coordinator) = setup();

        let (alice, mut alice_rx) = test_connection(1);
        let (bob, mut bob_rx) = test_connection(2);
        hub.register(alice.clone()).await;
        hub.register(bob.clone()).await;
        hub.join(alice.id, 42).await;
        hub.join(bob.id, 42).await;
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        coordinator.handle_typing(&alice, 42, true).await;
        coordinator.handle_typing(&alice, 42, false).await;

        assert!(drain(&mut alice_rx).is_empty());
        assert_eq!(
            drain(&mut bob_rx),
            vec![
                ServerEvent::TypingStart {
                    user_id: 1,
                    conversation_id: 42
                },
                ServerEvent::TypingStop {
                    user_id: 1,
                    conversation_id: 42
                },
            ]
        );
    }
}
