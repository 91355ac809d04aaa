use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;

use parley_core::models::{Message, MessageRecord, MessageStatus, NewMessage};
use parley_core::{DeliveryStore, StoreError};

use crate::events::ServerEvent;
use crate::hub::{ConnectionHandle, SessionUser, UserId};

pub(crate) fn test_connection(
    user_id: UserId,
) -> (ConnectionHandle, mpsc::UnboundedReceiver<ServerEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = ConnectionHandle::new(
        SessionUser {
            id: user_id,
            phone_number: format!("+1555{:07}", user_id),
        },
        tx,
    );
    (handle, rx)
}

pub(crate) fn drain(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// In-memory stand-in for the persistence gateway, mirroring the Postgres
/// store's transition rules so coordinator semantics can be tested without a
/// database.
pub(crate) struct MemStore {
    inner: Mutex<MemInner>,
}

struct MemInner {
    next_id: i64,
    participants: HashMap<i64, Vec<UserId>>,
    messages: HashMap<i64, Message>,
    fail_creates: bool,
}

impl MemStore {
    pub fn new() -> Self {
        MemStore {
            inner: Mutex::new(MemInner {
                next_id: 1,
                participants: HashMap::new(),
                messages: HashMap::new(),
                fail_creates: false,
            }),
        }
    }

    pub fn set_participants(&self, conversation_id: i64, participants: Vec<UserId>) {
        self.inner
            .lock()
            .unwrap()
            .participants
            .insert(conversation_id, participants);
    }

    pub fn set_next_message_id(&self, next_id: i64) {
        self.inner.lock().unwrap().next_id = next_id;
    }

    pub fn fail_creates(&self, fail: bool) {
        self.inner.lock().unwrap().fail_creates = fail;
    }

    pub fn message(&self, message_id: i64) -> Option<Message> {
        self.inner.lock().unwrap().messages.get(&message_id).cloned()
    }

    pub fn message_count(&self) -> usize {
        self.inner.lock().unwrap().messages.len()
    }
}

#[async_trait]
impl DeliveryStore for MemStore {
    async fn create_message(&self, new: NewMessage) -> Result<MessageRecord, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_creates {
            return Err(StoreError::Internal("simulated write failure".to_string()));
        }

        let id = inner.next_id;
        inner.next_id += 1;

        let message = Message {
            id,
            conversation_id: new.conversation_id,
            sender_id: new.sender_id,
            content: new.content,
            kind: new.kind,
            file_url: new.file_url,
            status: MessageStatus::Sent,
            is_read: false,
            created_at: Utc::now(),
            delivered_at: None,
            read_at: None,
        };
        inner.messages.insert(id, message.clone());

        Ok(MessageRecord::from_parts(message, None, None))
    }

    async fn message_by_id(&self, message_id: i64) -> Result<Option<Message>, StoreError> {
        Ok(self.inner.lock().unwrap().messages.get(&message_id).cloned())
    }

    async fn conversation_participants(
        &self,
        conversation_id: i64,
    ) -> Result<Vec<UserId>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .participants
            .get(&conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn advance_message_status(
        &self,
        message_id: i64,
        status: MessageStatus,
    ) -> Result<usize, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(message) = inner.messages.get_mut(&message_id) else {
            return Ok(0);
        };

        match status {
            MessageStatus::Sent => Ok(0),
            MessageStatus::Delivered => {
                if message.status == MessageStatus::Sent {
                    message.status = MessageStatus::Delivered;
                    message.delivered_at = Some(Utc::now());
                    Ok(1)
                } else {
                    Ok(0)
                }
            }
            MessageStatus::Read => {
                if message.status != MessageStatus::Read {
                    message.status = MessageStatus::Read;
                    message.is_read = true;
                    message.read_at = Some(Utc::now());
                    Ok(1)
                } else {
                    Ok(0)
                }
            }
        }
    }

    async fn mark_conversation_read(
        &self,
        conversation_id: i64,
        reader_id: UserId,
    ) -> Result<usize, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let mut affected = 0;
        for message in inner.messages.values_mut() {
            if message.conversation_id == conversation_id
                && message.sender_id != reader_id
                && message.status != MessageStatus::Read
            {
                message.status = MessageStatus::Read;
                message.is_read = true;
                message.read_at = Some(Utc::now());
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn delete_message(&self, message_id: i64) -> Result<(), StoreError> {
        self.inner.lock().unwrap().messages.remove(&message_id);
        Ok(())
    }

    async fn delete_conversation(&self, conversation_id: i64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .messages
            .retain(|_, m| m.conversation_id != conversation_id);
        inner.participants.remove(&conversation_id);
        Ok(())
    }

    async fn clear_conversation(&self, conversation_id: i64) -> Result<usize, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.messages.len();
        inner
            .messages
            .retain(|_, m| m.conversation_id != conversation_id);
        Ok(before - inner.messages.len())
    }
}
