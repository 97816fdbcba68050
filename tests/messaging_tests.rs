mod common;

use common::*;

use creator_market::chat::{self, CreateGroupRequest, SendMessageRequest};
use creator_market::chat_server::RelayEvent;
use creator_market::error::AppError;
use creator_market::models::MessageStatus;
use creator_market::store::{MemoryStore, Store};

fn text(chat_id: &str, content: &str) -> SendMessageRequest {
    SendMessageRequest {
        chat_id: chat_id.to_string(),
        content: content.to_string(),
        media: None,
    }
}

#[actix_web::test]
async fn link_messages_wait_for_moderation() {
    let store = MemoryStore::new();
    let relay = RecordingRelay::default();
    let setup = open_project(&store, 1000, 500).await;
    let group = store.group_chat_for_project(&setup.project.id).await.unwrap().unwrap();

    let held = chat::send_message(&store, &relay, &setup.client, text(&group.id, "check this out http://example.com"))
        .await
        .unwrap();
    assert_eq!(held.status, MessageStatus::Pending);
    assert!(chat::all_messages(&store, &setup.client, &group.id).await.unwrap().is_empty());

    let queue = chat::view_links(&store, &setup.manager, &group.id).await.unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].id, held.id);

    let approved = chat::approve_link(&store, &relay, &setup.manager, &held.id).await.unwrap();
    assert_eq!(approved.status, MessageStatus::Approved);
    let visible = chat::all_messages(&store, &setup.client, &group.id).await.unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id, held.id);
    assert!(chat::view_links(&store, &setup.manager, &group.id).await.unwrap().is_empty());

    let events = relay.published();
    assert!(matches!(events[0].1, RelayEvent::PendingLink { .. }));
    assert!(matches!(events[1].1, RelayEvent::LinkApproved(_)));
    let audiences = relay.audiences();
    assert_eq!(audiences[0], Some(vec![setup.manager.user_id.clone()]));
    assert_eq!(audiences[1], None);
}

#[actix_web::test]
async fn discarded_links_disappear() {
    let store = MemoryStore::new();
    let relay = RecordingRelay::default();
    let setup = open_project(&store, 1000, 500).await;
    let group = store.group_chat_for_project(&setup.project.id).await.unwrap().unwrap();

    let held = chat::send_message(&store, &relay, &setup.client, text(&group.id, "www.spam.io"))
        .await
        .unwrap();
    chat::discard_link(&store, &relay, &setup.manager, &held.id).await.unwrap();

    assert!(store.message(&held.id).await.unwrap().is_none());
    assert!(chat::view_links(&store, &setup.manager, &group.id).await.unwrap().is_empty());
    let err = chat::approve_link(&store, &relay, &setup.manager, &held.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[actix_web::test]
async fn clients_cannot_moderate() {
    let store = MemoryStore::new();
    let relay = RecordingRelay::default();
    let setup = open_project(&store, 1000, 500).await;
    let group = store.group_chat_for_project(&setup.project.id).await.unwrap().unwrap();
    let held = chat::send_message(&store, &relay, &setup.client, text(&group.id, "https://x.dev"))
        .await
        .unwrap();

    let err = chat::view_links(&store, &setup.client, &group.id).await.unwrap_err();
    assert!(matches!(err, AppError::Permission(_)));
    let err = chat::approve_link(&store, &relay, &setup.client, &held.id).await.unwrap_err();
    assert!(matches!(err, AppError::Permission(_)));
}

#[actix_web::test]
async fn plain_messages_are_published_in_order() {
    let store = MemoryStore::new();
    let relay = RecordingRelay::default();
    let setup = open_project(&store, 1000, 500).await;
    let group = store.group_chat_for_project(&setup.project.id).await.unwrap().unwrap();

    chat::send_message(&store, &relay, &setup.client, text(&group.id, "first draft?")).await.unwrap();
    chat::send_message(&store, &relay, &setup.manager, text(&group.id, "friday")).await.unwrap();

    let history = chat::all_messages(&store, &setup.manager, &group.id).await.unwrap();
    let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["first draft?", "friday"]);
    let events = relay.published();
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|(chat_id, e)| chat_id == &group.id && matches!(e, RelayEvent::Message(_))));
}

#[actix_web::test]
async fn outsiders_cannot_read_or_write() {
    let store = MemoryStore::new();
    let relay = RecordingRelay::default();
    let setup = open_project(&store, 1000, 500).await;
    let (outsider, _) = seed_freelancer(&store, "eve", &[]).await;
    let group = store.group_chat_for_project(&setup.project.id).await.unwrap().unwrap();

    let err = chat::send_message(&store, &relay, &outsider, text(&group.id, "hi")).await.unwrap_err();
    assert!(matches!(err, AppError::Permission(_)));
    let err = chat::all_messages(&store, &outsider, &group.id).await.unwrap_err();
    assert!(matches!(err, AppError::Permission(_)));
    assert!(relay.published().is_empty());
}

#[actix_web::test]
async fn direct_chat_is_shared_by_both_sides() {
    let store = MemoryStore::new();
    let (a, _) = seed_client(&store, "a", 0).await;
    let (b, _) = seed_freelancer(&store, "b", &[]).await;

    let opened = chat::access_chat(&store, &a, &b.user_id).await.unwrap();
    let reopened = chat::access_chat(&store, &b, &a.user_id).await.unwrap();

    assert_eq!(opened.id, reopened.id);
    assert!(!opened.is_group_chat);
    assert_eq!(chat::fetch_chats(&store, &a).await.unwrap().len(), 1);
    assert!(matches!(
        chat::access_chat(&store, &a, &a.user_id).await.unwrap_err(),
        AppError::Validation(_)
    ));
}

#[actix_web::test]
async fn group_changes_are_for_the_group_admin() {
    let store = MemoryStore::new();
    let relay = RecordingRelay::default();
    let (owner, _) = seed_client(&store, "owner", 0).await;
    let (b, _) = seed_freelancer(&store, "b", &[]).await;
    let (c, _) = seed_freelancer(&store, "c", &[]).await;
    let (d, _) = seed_freelancer(&store, "d", &[]).await;

    let too_small = chat::create_group_chat(
        &store,
        &owner,
        CreateGroupRequest { name: "crew".into(), users: vec![b.user_id.clone()] },
    )
    .await
    .unwrap_err();
    assert!(matches!(too_small, AppError::Validation(_)));

    let group = chat::create_group_chat(
        &store,
        &owner,
        CreateGroupRequest {
            name: "crew".into(),
            users: vec![b.user_id.clone(), c.user_id.clone()],
        },
    )
    .await
    .unwrap();
    assert_eq!(group.users.len(), 3);

    let err = chat::add_to_group(&store, &b, &group.id, &d.user_id).await.unwrap_err();
    assert!(matches!(err, AppError::Permission(_)));

    let renamed = chat::rename_group(&store, &owner, &group.id, "night crew").await.unwrap();
    assert_eq!(renamed.chat_name, "night crew");
    let grown = chat::add_to_group(&store, &owner, &group.id, &d.user_id).await.unwrap();
    assert!(grown.has_member(&d.user_id));
    let shrunk = chat::remove_from_group(&store, &relay, &owner, &group.id, &b.user_id).await.unwrap();
    assert!(!shrunk.has_member(&b.user_id));
    assert_eq!(*relay.evicted.lock().unwrap(), vec![(group.id.clone(), b.user_id.clone())]);
    let err = chat::remove_from_group(&store, &relay, &owner, &group.id, &owner.user_id).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[actix_web::test]
async fn project_participants_stay_in_the_project_chat() {
    let store = MemoryStore::new();
    let relay = RecordingRelay::default();
    let setup = open_project(&store, 1000, 500).await;
    let (fay, _) = seed_freelancer(&store, "fay", &[]).await;
    hire(&store, &setup.manager, &setup.project.id, &fay).await;
    let group = store.group_chat_for_project(&setup.project.id).await.unwrap().unwrap();

    for member in [&fay.user_id, &setup.client.user_id] {
        let err = chat::remove_from_group(&store, &relay, &setup.manager, &group.id, member)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    let group = store.chat(&group.id).await.unwrap().unwrap();
    assert!(group.has_member(&fay.user_id));
    assert!(group.has_member(&setup.client.user_id));
    assert!(relay.evicted.lock().unwrap().is_empty());
}
