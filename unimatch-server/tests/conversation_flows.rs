//! End-to-end conversations driven through the dispatcher, with the
//! in-memory store and a messenger that records every delivery.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use unimatch_server::command::{Command, Decision, Selection};
use unimatch_server::config::ChannelConfig;
use unimatch_server::engine::Matchmaker;
use unimatch_server::messenger::{ChatId, Delivery, DeliveryError, MessageRef, Messenger};
use unimatch_server::profile::{PhotoRef, UserId};
use unimatch_server::repository::{InMemoryRepository, ProfileRepository};
use unimatch_server::state_machine::interpreter::Services;
use unimatch_server::state_machine::Event;
use unimatch_server::{app_router, AppState, Dispatcher};

#[derive(Default)]
struct RecordingMessenger {
    outsiders: Mutex<HashSet<i64>>,
    sent: Mutex<Vec<(ChatId, Delivery)>>,
}

impl RecordingMessenger {
    fn leave_channels(&self, user: i64) {
        self.outsiders.lock().unwrap().insert(user);
    }

    /// Drain everything delivered so far.
    fn take(&self) -> Vec<(ChatId, Delivery)> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }

    fn take_bodies_for(&self, chat: ChatId) -> Vec<String> {
        self.take()
            .into_iter()
            .filter(|(to, _)| *to == chat)
            .map(|(_, d)| d.body().to_string())
            .collect()
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn is_member(&self, _channel: &str, user: UserId) -> Result<bool, DeliveryError> {
        Ok(!self.outsiders.lock().unwrap().contains(&user.0))
    }

    async fn deliver(&self, chat: &ChatId, delivery: &Delivery) -> Result<(), DeliveryError> {
        self.sent
            .lock()
            .unwrap()
            .push((chat.clone(), delivery.clone()));
        Ok(())
    }

    async fn replace(&self, target: &MessageRef, delivery: &Delivery) -> Result<(), DeliveryError> {
        self.sent
            .lock()
            .unwrap()
            .push((ChatId::User(UserId(target.chat)), delivery.clone()));
        Ok(())
    }
}

struct Harness {
    dispatcher: Dispatcher,
    messenger: Arc<RecordingMessenger>,
    repository: Arc<InMemoryRepository>,
}

impl Harness {
    fn new() -> Self {
        let messenger = Arc::new(RecordingMessenger::default());
        let repository = Arc::new(InMemoryRepository::new());
        let dispatcher = Dispatcher::new(Services {
            engine: Matchmaker::new(repository.clone()),
            messenger: messenger.clone(),
            channels: ChannelConfig::default(),
        });
        Self {
            dispatcher,
            messenger,
            repository,
        }
    }

    async fn send(&self, user: i64, event: Event) {
        self.dispatcher.dispatch(UserId(user), None, event).await;
    }

    async fn text(&self, user: i64, text: &str) {
        self.send(user, Event::Text(text.to_string())).await;
    }

    async fn command(&self, user: i64, command: Command) {
        self.send(user, Event::Command(command)).await;
    }

    /// Walk a user through the whole registration conversation.
    async fn register(&self, user: i64, name: &str, gender: &str, university: &str, wants: &str) {
        self.command(user, Command::Start).await;
        self.text(user, name).await;
        self.text(user, university).await;
        self.text(user, "22").await;
        self.text(user, gender).await;
        self.send(user, Event::Selection(Selection::Toggle(wants.to_string())))
            .await;
        self.send(user, Event::Selection(Selection::Confirm)).await;
        self.text(user, "Coffee and chess").await;
        self.text(user, "Fourth year engineering").await;
        self.send(user, Event::Photo(PhotoRef::from(format!("photo-{}", user).as_str())))
            .await;
    }
}

fn to(user: i64) -> ChatId {
    ChatId::User(UserId(user))
}

#[tokio::test]
async fn test_registration_conversation_stores_the_profile() {
    let h = Harness::new();

    h.command(1, Command::Start).await;
    let welcome = h.messenger.take_bodies_for(to(1));
    assert_eq!(welcome.len(), 1);
    assert!(welcome[0].contains("What's your name?"));

    h.text(1, "Abebe").await;
    h.text(1, "Harvard").await;
    let replies = h.messenger.take_bodies_for(to(1));
    assert!(replies[1].contains("select a university from the list"), "{:?}", replies);

    h.text(1, "Jimma University").await;
    h.text(1, "seventeen").await;
    h.text(1, "17").await;
    h.text(1, "20").await;
    h.text(1, "male").await;
    h.text(1, "Male").await;
    h.send(1, Event::Selection(Selection::Confirm)).await;
    h.send(1, Event::Selection(Selection::Toggle("All Universities".into())))
        .await;
    h.send(1, Event::Selection(Selection::Confirm)).await;
    h.text(1, "Music").await;
    h.text(1, "Hello").await;
    h.text(1, "no photo").await;
    h.send(1, Event::Photo(PhotoRef::from("p1"))).await;

    let replies = h.messenger.take_bodies_for(to(1));
    assert!(replies.last().unwrap().contains("Profile created"), "{:?}", replies);

    let user = h.repository.get_user(UserId(1)).await.unwrap().unwrap();
    let profile = user.profile.unwrap();
    assert_eq!(profile.name, "Abebe");
    assert_eq!(profile.university, "Jimma University");
    assert_eq!(profile.age, 20);
    assert_eq!(profile.preferred_universities, vec!["All Universities"]);
    assert_eq!(profile.photo, PhotoRef::from("p1"));
    assert!(h.dispatcher.sessions().is_empty());

    h.command(1, Command::Start).await;
    let replies = h.messenger.take_bodies_for(to(1));
    assert!(replies[0].contains("Welcome back"), "{:?}", replies);
}

#[tokio::test]
async fn test_non_member_is_told_to_join() {
    let h = Harness::new();
    h.messenger.leave_channels(7);

    h.command(7, Command::Start).await;
    let replies = h.messenger.take_bodies_for(to(7));
    assert_eq!(replies.len(), 1);
    assert!(replies[0].contains("https://t.me/unimatch_ethio"));
    assert!(h.repository.get_user(UserId(7)).await.unwrap().is_none());
}

#[tokio::test]
async fn test_mutual_like_becomes_a_match_and_opens_a_relay() {
    let h = Harness::new();
    h.register(1, "Abebe", "Male", "Jimma University", "All Universities")
        .await;
    h.register(2, "Hana", "Female", "Bahir Dar University", "Jimma University")
        .await;
    h.messenger.take();

    h.command(1, Command::Browse).await;
    let preview = h.messenger.take();
    assert!(matches!(&preview[0].1, Delivery::Photo { caption, .. } if caption.contains("Hana")));

    h.send(1, Event::Decision(Decision::Like)).await;
    let sent = h.messenger.take();
    assert!(sent
        .iter()
        .any(|(chat, d)| *chat == to(2) && d.body().contains("Someone just liked")));
    assert!(sent
        .iter()
        .any(|(chat, d)| *chat == to(1) && d.body().starts_with("👍 Liked")));

    h.send(1, Event::Decision(Decision::Like)).await;
    let replies = h.messenger.take_bodies_for(to(1));
    assert!(replies[0].contains("No profile selected"), "{:?}", replies);

    h.command(2, Command::Browse).await;
    h.send(2, Event::Decision(Decision::Like)).await;
    let sent = h.messenger.take();
    assert!(sent
        .iter()
        .any(|(chat, d)| *chat == to(1) && d.body().contains("You and Hana liked each other")));
    assert!(sent
        .iter()
        .any(|(chat, d)| *chat == to(2) && d.body().contains("You and Abebe liked each other")));

    h.send(1, Event::Selection(Selection::ChatWith(UserId(2)))).await;
    let replies = h.messenger.take_bodies_for(to(1));
    assert!(replies[0].contains("chatting anonymously with Hana"));

    h.text(1, "Hi there").await;
    let relayed = h.messenger.take_bodies_for(to(2));
    assert_eq!(relayed.len(), 1);
    assert!(relayed[0].ends_with("Hi there"));
    assert!(!relayed[0].contains("Abebe"));

    h.text(2, "Hello back").await;
    assert_eq!(h.messenger.take_bodies_for(to(1)).len(), 1);

    h.command(2, Command::StopChat).await;
    let sent = h.messenger.take();
    assert!(sent
        .iter()
        .any(|(chat, d)| *chat == to(1) && d.body().contains("Your match has left")));
    assert!(sent
        .iter()
        .any(|(chat, d)| *chat == to(2) && d.body().contains("You have left the chat")));

    h.command(2, Command::StopChat).await;
    let replies = h.messenger.take_bodies_for(to(2));
    assert!(replies[0].contains("not in a chat session"));

    let stats = h.repository.stats().await.unwrap();
    assert_eq!(stats.matches, 1);
    assert_eq!(stats.chatting, 0);
}

#[tokio::test]
async fn test_chat_requires_a_match() {
    let h = Harness::new();
    h.register(1, "Abebe", "Male", "Jimma University", "All Universities")
        .await;
    h.register(2, "Hana", "Female", "Jimma University", "All Universities")
        .await;
    h.messenger.take();

    h.send(1, Event::Selection(Selection::ChatWith(UserId(2)))).await;
    let replies = h.messenger.take_bodies_for(to(1));
    assert!(replies[0].contains("only chat with your matches"));

    h.send(1, Event::Selection(Selection::ChatWith(UserId(99)))).await;
    let replies = h.messenger.take_bodies_for(to(1));
    assert!(replies[0].contains("not found"), "{:?}", replies);
}

/// 1 matches both 2 and 3, chats with 2, then moves on to 3.
async fn abandoned_by_one(h: &Harness) {
    h.register(1, "Abebe", "Male", "Jimma University", "All Universities")
        .await;
    h.register(2, "Hana", "Female", "Jimma University", "All Universities")
        .await;
    h.register(3, "Sara", "Female", "Jimma University", "All Universities")
        .await;

    for _ in 0..2 {
        h.command(1, Command::Browse).await;
        h.send(1, Event::Decision(Decision::Like)).await;
    }
    for user in [2, 3] {
        h.command(user, Command::Browse).await;
        h.send(user, Event::Decision(Decision::Like)).await;
    }

    h.send(1, Event::Selection(Selection::ChatWith(UserId(2)))).await;
    h.send(1, Event::Selection(Selection::ChatWith(UserId(3)))).await;
    h.messenger.take();
}

#[tokio::test]
async fn test_moving_on_expires_the_old_session() {
    let h = Harness::new();
    abandoned_by_one(&h).await;

    h.text(2, "Are you there?").await;
    let sent = h.messenger.take();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, to(2));
    assert!(sent[0].1.body().contains("Chat session expired"));

    h.text(3, "Hey").await;
    let relayed = h.messenger.take_bodies_for(to(1));
    assert!(relayed[0].ends_with("Hey"));
}

#[tokio::test]
async fn test_abandoned_user_leaving_does_not_disturb_new_chat() {
    let h = Harness::new();
    abandoned_by_one(&h).await;

    h.command(2, Command::StopChat).await;
    let sent = h.messenger.take();
    assert_eq!(sent.len(), 1, "{:?}", sent);
    assert_eq!(sent[0].0, to(2));
    assert!(sent[0].1.body().contains("You have left the chat"));

    let one = h.repository.get_user(UserId(1)).await.unwrap().unwrap();
    assert_eq!(one.chat_partner, Some(UserId(3)));
    h.text(1, "Still here").await;
    assert_eq!(h.messenger.take_bodies_for(to(3)).len(), 1);
}

#[tokio::test]
async fn test_confession_is_posted_to_the_channel() {
    let h = Harness::new();

    h.command(5, Command::Confess).await;
    h.text(5, &"x".repeat(501)).await;
    h.text(5, "I still sleep with a nightlight").await;

    let sent = h.messenger.take();
    let posted: Vec<_> = sent
        .iter()
        .filter(|(chat, _)| *chat == ChatId::Channel("@unimatch_confession".into()))
        .collect();
    assert_eq!(posted.len(), 1);
    assert!(posted[0].1.body().ends_with("I still sleep with a nightlight"));
    assert!(!posted[0].1.body().contains('5'));
    assert!(sent
        .iter()
        .any(|(chat, d)| *chat == to(5) && d.body().contains("posted anonymously")));

    h.text(5, "another one").await;
    assert!(h
        .messenger
        .take()
        .iter()
        .all(|(chat, _)| matches!(chat, ChatId::User(_))));
}

fn app(h: &Harness, status_token: Option<&str>) -> axum::Router {
    app_router(Arc::new(AppState {
        dispatcher: h.dispatcher.clone(),
        webhook_secret: "hook_secret".to_string(),
        status_auth_token: status_token.map(str::to_string),
        recording_logger: None,
    }))
}

#[tokio::test]
async fn test_health_needs_no_auth() {
    let response = app(&Harness::new(), None)
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_webhook_rejects_a_wrong_secret() {
    let update = r#"{"update_id": 1}"#;

    let response = app(&Harness::new(), None)
        .oneshot(
            Request::post("/webhook")
                .header("content-type", "application/json")
                .header("x-telegram-bot-api-secret-token", "nope")
                .body(Body::from(update))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app(&Harness::new(), None)
        .oneshot(
            Request::post("/webhook")
                .header("x-telegram-bot-api-secret-token", "hook_secret")
                .body(Body::from(update))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app(&Harness::new(), None)
        .oneshot(
            Request::post("/webhook")
                .header("x-telegram-bot-api-secret-token", "hook_secret")
                .body(Body::from("not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_status_is_bearer_protected() {
    let response = app(&Harness::new(), None)
        .oneshot(Request::get("/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app(&Harness::new(), Some("ops"))
        .oneshot(Request::get("/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app(&Harness::new(), Some("ops"))
        .oneshot(
            Request::get("/status")
                .header("authorization", "Bearer ops")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_webhook_update_reaches_the_user() {
    let h = Harness::new();
    let update = r#"{
        "update_id": 10,
        "message": {
            "message_id": 1,
            "from": { "id": 42, "is_bot": false },
            "chat": { "id": 42, "type": "private" },
            "text": "/start"
        }
    }"#;

    let response = app(&h, None)
        .oneshot(
            Request::post("/webhook")
                .header("x-telegram-bot-api-secret-token", "hook_secret")
                .body(Body::from(update))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut replies = Vec::new();
    for _ in 0..200 {
        replies.extend(h.messenger.take_bodies_for(to(42)));
        if !replies.is_empty() && h.dispatcher.busy_users() == 0 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(replies.len(), 1, "{:?}", replies);
    assert!(replies[0].contains("What's your name?"));
}
