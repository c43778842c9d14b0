//! Conversation engine: drives one sender's session per inbound message.

use super::replies;
use super::state::{Action, UserSession, UserState, step};
use super::store::SessionStore;
use crate::cloud_api::Messenger;
use crate::error::Result;
use crate::pairing::{PairingConnector, PairingOutcome, PhoneNumber, sender_key};
use crate::webhook::InboundMessage;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct ConversationEngine {
    store: Arc<dyn SessionStore>,
    messenger: Arc<dyn Messenger>,
    connector: Arc<dyn PairingConnector>,
    /// One lock per sender currently being handled.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ConversationEngine {
    pub fn new(
        store: Arc<dyn SessionStore>,
        messenger: Arc<dyn Messenger>,
        connector: Arc<dyn PairingConnector>,
    ) -> Self {
        Self {
            store,
            messenger,
            connector,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Advance the sender's session by one message and send exactly one reply.
    ///
    /// Messages from the same sender are handled one at a time. The new state
    /// is stored only once the reply has been sent; if sending fails the
    /// session is left as it was and the error is returned.
    pub async fn handle(&self, message: &InboundMessage) -> Result<UserState> {
        let key = sender_key(&message.from).to_string();

        let lock = self.locks.lock().await.entry(key.clone()).or_default().clone();
        let result = {
            let _guard = lock.lock().await;
            self.advance(&key, message).await
        };
        drop(lock);
        self.release(&key).await;

        result
    }

    async fn advance(&self, key: &str, message: &InboundMessage) -> Result<UserState> {
        let mut session = match self.store.get(key).await? {
            Some(session) => session,
            None => {
                self.store.purge_expired().await?;
                UserSession::new(key)
            }
        };

        let step = step(session.state, &message.text);
        tracing::debug!(
            "Session {}: {:?} -> {:?} ({:?})",
            key,
            session.state,
            step.next,
            step.action
        );

        let reply = self.perform(step.action, &mut session).await;
        self.messenger
            .send(&message.phone_number_id, &message.from, &reply)
            .await?;

        session.state = step.next;
        self.store.set(session).await?;
        Ok(step.next)
    }

    /// Run the side effects of `action` and return the reply text.
    ///
    /// Connector failures are reported to the user instead of surfacing as errors.
    async fn perform(&self, action: Action, session: &mut UserSession) -> String {
        match action {
            Action::AskPermission => replies::PERMISSION_PROMPT.to_string(),
            Action::Decline => replies::DECLINED.to_string(),
            Action::RemindPairing => replies::PAIRING_REMINDER.to_string(),
            Action::StartPairing => self.start_pairing(session).await,
            Action::ReportGroups => match self.connector.groups().await {
                Ok(groups) => {
                    tracing::info!("Session {}: {} groups", session.phone_number, groups.len());
                    replies::group_count(groups.len())
                }
                Err(e) => {
                    tracing::warn!("Session {}: failed to fetch groups: {}", session.phone_number, e);
                    replies::GROUPS_UNAVAILABLE.to_string()
                }
            },
        }
    }

    async fn start_pairing(&self, session: &mut UserSession) -> String {
        let outcome = match PhoneNumber::parse(&session.phone_number) {
            Ok(phone) => self.connector.request_pairing_code(&phone).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(PairingOutcome::Code { code, handle }) => {
                tracing::info!("Session {}: pairing code issued", session.phone_number);
                let reply = replies::pairing_instructions(&code);
                session.pairing_code = Some(code);
                session.handle = Some(handle);
                reply
            }
            Ok(PairingOutcome::AlreadyRegistered { handle }) => {
                tracing::info!("Session {}: device already linked", session.phone_number);
                session.pairing_code = None;
                session.handle = Some(handle);
                replies::ALREADY_LINKED.to_string()
            }
            Err(e) => {
                tracing::warn!(
                    "Session {}: pairing code request failed: {}",
                    session.phone_number,
                    e
                );
                replies::PAIRING_FAILED.to_string()
            }
        }
    }

    async fn release(&self, key: &str) {
        let mut locks = self.locks.lock().await;
        if locks.get(key).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(key);
        }
    }

    #[cfg(test)]
    async fn tracked_locks(&self) -> usize {
        self.locks.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud_api::MockMessenger;
    use crate::conversation::InMemorySessionStore;
    use crate::error::BridgeError;
    use crate::pairing::{GroupInfo, MockPairingConnector, OfflineConnector, SessionHandle};
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Outbox = Arc<StdMutex<Vec<(String, String)>>>;

    fn recording_messenger() -> (MockMessenger, Outbox) {
        let outbox: Outbox = Arc::default();
        let sink = outbox.clone();
        let mut messenger = MockMessenger::new();
        messenger.expect_send().returning(move |_, to, text| {
            sink.lock().unwrap().push((to.to_string(), text.to_string()));
            Ok(())
        });
        (messenger, outbox)
    }

    fn group(id: &str) -> GroupInfo {
        GroupInfo {
            id: format!("{id}@g.us"),
            name: id.to_string(),
            participants: vec![],
            participant_count: 0,
            creation: None,
        }
    }

    fn inbound(from: &str, text: &str) -> InboundMessage {
        InboundMessage {
            phone_number_id: "123456789".into(),
            from: from.into(),
            text: text.into(),
        }
    }

    fn engine(
        store: Arc<InMemorySessionStore>,
        messenger: MockMessenger,
        connector: MockPairingConnector,
    ) -> ConversationEngine {
        ConversationEngine::new(store, Arc::new(messenger), Arc::new(connector))
    }

    fn last_reply(outbox: &Outbox) -> String {
        outbox.lock().unwrap().last().unwrap().1.clone()
    }

    #[tokio::test]
    async fn test_full_happy_path() {
        let (messenger, outbox) = recording_messenger();
        let mut connector = MockPairingConnector::new();
        connector
            .expect_request_pairing_code()
            .withf(|phone| phone.as_str() == "972500000001")
            .times(1)
            .returning(|_| {
                Ok(PairingOutcome::Code {
                    code: "ABCD-EFGH".into(),
                    handle: SessionHandle::new(),
                })
            });
        connector
            .expect_groups()
            .times(2)
            .returning(|| Ok(vec![group("a"), group("b"), group("c")]));

        let store = Arc::new(InMemorySessionStore::default());
        let engine = engine(store.clone(), messenger, connector);
        let from = "972500000001";

        assert_eq!(
            engine.handle(&inbound(from, "hi")).await.unwrap(),
            UserState::WaitingForPermission
        );
        assert_eq!(last_reply(&outbox), replies::PERMISSION_PROMPT);

        assert_eq!(
            engine.handle(&inbound(from, "Yes")).await.unwrap(),
            UserState::WaitingForPairing
        );
        assert!(last_reply(&outbox).contains("ABCD-EFGH"));
        let stored = store.get(from).await.unwrap().unwrap();
        assert_eq!(stored.pairing_code.as_deref(), Some("ABCD-EFGH"));
        assert!(stored.handle.is_some());

        assert_eq!(
            engine.handle(&inbound(from, "later")).await.unwrap(),
            UserState::WaitingForPairing
        );
        assert_eq!(last_reply(&outbox), replies::PAIRING_REMINDER);

        assert_eq!(
            engine.handle(&inbound(from, "סיימתי")).await.unwrap(),
            UserState::Connected
        );
        assert_eq!(last_reply(&outbox), "You are a member of 3 WhatsApp groups.");

        assert_eq!(
            engine.handle(&inbound(from, "again")).await.unwrap(),
            UserState::Connected
        );
        assert_eq!(last_reply(&outbox), "You are a member of 3 WhatsApp groups.");

        let sent = outbox.lock().unwrap();
        assert_eq!(sent.len(), 5);
        assert!(sent.iter().all(|(to, _)| to == from));
    }

    #[tokio::test]
    async fn test_decline_returns_to_idle() {
        let (messenger, outbox) = recording_messenger();
        let mut connector = MockPairingConnector::new();
        connector.expect_request_pairing_code().never();

        let store = Arc::new(InMemorySessionStore::default());
        let engine = engine(store.clone(), messenger, connector);

        engine.handle(&inbound("1", "hello")).await.unwrap();
        assert_eq!(
            engine.handle(&inbound("1", "no")).await.unwrap(),
            UserState::Idle
        );
        assert_eq!(last_reply(&outbox), replies::DECLINED);

        assert_eq!(
            engine.handle(&inbound("1", "hello again")).await.unwrap(),
            UserState::WaitingForPermission
        );
        assert_eq!(last_reply(&outbox), replies::PERMISSION_PROMPT);
    }

    #[tokio::test]
    async fn test_pairing_failure_sends_fallback_without_code() {
        let (messenger, outbox) = recording_messenger();
        let mut connector = MockPairingConnector::new();
        connector
            .expect_request_pairing_code()
            .returning(|_| Err(BridgeError::Pairing("socket closed".into())));

        let store = Arc::new(InMemorySessionStore::default());
        let engine = engine(store.clone(), messenger, connector);

        engine.handle(&inbound("1", "hi")).await.unwrap();
        let state = engine.handle(&inbound("1", "yes")).await.unwrap();

        assert_eq!(state, UserState::WaitingForPairing);
        assert_eq!(last_reply(&outbox), replies::PAIRING_FAILED);
        assert_eq!(store.get("1").await.unwrap().unwrap().pairing_code, None);
    }

    #[tokio::test]
    async fn test_already_registered() {
        let (messenger, outbox) = recording_messenger();
        let mut connector = MockPairingConnector::new();
        connector.expect_request_pairing_code().returning(|_| {
            Ok(PairingOutcome::AlreadyRegistered {
                handle: SessionHandle::new(),
            })
        });

        let engine = engine(Arc::default(), messenger, connector);
        engine.handle(&inbound("1", "hi")).await.unwrap();
        engine.handle(&inbound("1", "yes")).await.unwrap();

        assert_eq!(last_reply(&outbox), replies::ALREADY_LINKED);
    }

    #[tokio::test]
    async fn test_second_sender_reuses_linked_device() {
        let dir = tempfile::tempdir().unwrap();
        let (messenger, outbox) = recording_messenger();
        let store = Arc::new(InMemorySessionStore::default());
        let engine = ConversationEngine::new(
            store.clone(),
            Arc::new(messenger),
            Arc::new(OfflineConnector::new(dir.path()).unwrap()),
        );

        for text in ["hi", "yes"] {
            engine.handle(&inbound("972500000001", text)).await.unwrap();
        }
        let code = store
            .get("972500000001")
            .await
            .unwrap()
            .unwrap()
            .pairing_code
            .expect("pairing code");
        assert_eq!(last_reply(&outbox), replies::pairing_instructions(&code));

        for text in ["hi", "yes"] {
            engine.handle(&inbound("972500000002", text)).await.unwrap();
        }
        assert_eq!(last_reply(&outbox), replies::ALREADY_LINKED);

        engine.handle(&inbound("972500000001", "done")).await.unwrap();
        let first = last_reply(&outbox);
        engine.handle(&inbound("972500000002", "done")).await.unwrap();
        assert_eq!(last_reply(&outbox), first);
        assert_eq!(first, replies::group_count(0));

        let first_session = store.get("972500000001").await.unwrap().unwrap();
        let second_session = store.get("972500000002").await.unwrap().unwrap();
        assert_eq!(first_session.pairing_code, Some(code));
        assert_eq!(second_session.pairing_code, None);
        assert!(first_session.handle.is_some());
        assert_eq!(first_session.handle, second_session.handle);
    }

    #[tokio::test]
    async fn test_groups_failure_still_connects() {
        let (messenger, outbox) = recording_messenger();
        let mut connector = MockPairingConnector::new();
        connector.expect_request_pairing_code().returning(|_| {
            Ok(PairingOutcome::Code {
                code: "1234-5678".into(),
                handle: SessionHandle::new(),
            })
        });
        connector
            .expect_groups()
            .returning(|| Err(BridgeError::NotConnected));

        let engine = engine(Arc::default(), messenger, connector);
        engine.handle(&inbound("1", "hi")).await.unwrap();
        engine.handle(&inbound("1", "yes")).await.unwrap();
        let state = engine.handle(&inbound("1", "done")).await.unwrap();

        assert_eq!(state, UserState::Connected);
        assert_eq!(last_reply(&outbox), replies::GROUPS_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_send_failure_keeps_previous_state() {
        let calls = AtomicUsize::new(0);
        let mut messenger = MockMessenger::new();
        messenger.expect_send().returning(move |_, _, _| {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(BridgeError::CloudApi {
                    status: 500,
                    body: "boom".into(),
                })
            } else {
                Ok(())
            }
        });

        let store = Arc::new(InMemorySessionStore::default());
        let engine = engine(store.clone(), messenger, MockPairingConnector::new());

        let err = engine.handle(&inbound("1", "hi")).await.unwrap_err();
        assert!(matches!(err, BridgeError::CloudApi { status: 500, .. }));
        assert_eq!(store.get("1").await.unwrap(), None);
        assert_eq!(engine.tracked_locks().await, 0);

        assert_eq!(
            engine.handle(&inbound("1", "hi")).await.unwrap(),
            UserState::WaitingForPermission
        );
    }

    #[tokio::test]
    async fn test_sender_suffix_shares_session() {
        let (messenger, outbox) = recording_messenger();
        let store = Arc::new(InMemorySessionStore::default());
        let engine = engine(store.clone(), messenger, MockPairingConnector::new());

        engine.handle(&inbound("972500000001", "hi")).await.unwrap();
        let state = engine
            .handle(&inbound("972500000001@s.whatsapp.net", "maybe"))
            .await
            .unwrap();

        assert_eq!(state, UserState::Idle);
        assert_eq!(store.len().await, 1);
        assert_eq!(outbox.lock().unwrap()[1].0, "972500000001@s.whatsapp.net");
    }

    /// Records replies after handing the scheduler back a few times, so that
    /// unserialised handlers of one sender would interleave.
    struct YieldingMessenger {
        outbox: Outbox,
    }

    #[async_trait::async_trait]
    impl Messenger for YieldingMessenger {
        async fn send(&self, _phone_number_id: &str, to: &str, text: &str) -> Result<()> {
            for _ in 0..8 {
                tokio::task::yield_now().await;
            }
            self.outbox.lock().unwrap().push((to.to_string(), text.to_string()));
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_senders_are_isolated() {
        let outbox: Outbox = Arc::default();
        let store = Arc::new(InMemorySessionStore::default());
        let engine = Arc::new(ConversationEngine::new(
            store.clone(),
            Arc::new(YieldingMessenger { outbox: outbox.clone() }),
            Arc::new(MockPairingConnector::new()),
        ));

        let senders: Vec<String> = (0..5).map(|i| format!("{}", 1000 + i)).collect();
        let tasks: Vec<_> = (0..20)
            .map(|i| {
                let engine = engine.clone();
                let from = senders[i % senders.len()].clone();
                tokio::spawn(async move { engine.handle(&inbound(&from, "hi")).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let outbox = outbox.lock().unwrap();
        assert_eq!(outbox.len(), 20);
        for sender in &senders {
            let replies: Vec<&str> = outbox
                .iter()
                .filter(|(to, _)| to == sender)
                .map(|(_, text)| text.as_str())
                .collect();
            assert_eq!(
                replies,
                [
                    replies::PERMISSION_PROMPT,
                    replies::DECLINED,
                    replies::PERMISSION_PROMPT,
                    replies::DECLINED,
                ],
                "sender {sender}"
            );
        }
        drop(outbox);
        assert_eq!(store.len().await, 5);
        assert_eq!(engine.tracked_locks().await, 0);
    }
}
