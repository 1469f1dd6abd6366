mod common;

use chrono::Utc;

use relay_protocol::{Message, MessageStatus, MessageType};

use common::{start, TestClient};

#[tokio::test]
async fn second_join_replaces_mapping() {
    let server = start().await;
    let mut first = TestClient::join(&server, "anna").await;
    let mut second = TestClient::join(&server, "anna").await;
    let mut bob = TestClient::join(&server, "bob").await;

    bob.send(Message::private("bob", "anna", "which one?")).await;

    assert_eq!(second.recv_chat().await.content, "which one?");
    first.expect_no_chat().await;
    assert_eq!(server.registry.len().await, 2);
}

#[tokio::test]
async fn text_reaches_everyone_but_sender() {
    let server = start().await;
    let mut anna = TestClient::join(&server, "anna").await;
    let mut bob = TestClient::join(&server, "bob").await;
    let mut carl = TestClient::join(&server, "carl").await;

    anna.send(Message::text("anna", "hello all")).await;

    for c in [&mut bob, &mut carl] {
        let m = c.recv_chat().await;
        assert_eq!(m.msg_type, MessageType::Text);
        assert_eq!(m.sender, "anna");
        assert_eq!(m.content, "hello all");
    }
    anna.expect_no_chat().await;
}

#[tokio::test]
async fn lone_broadcast_reaches_nobody() {
    let server = start().await;
    let mut solo = TestClient::join(&server, "solo").await;

    solo.send(Message::text("solo", "anyone?")).await;

    solo.expect_no_chat().await;
    assert_eq!(server.registry.len().await, 1);
}

#[tokio::test]
async fn group_reaches_each_member_once_and_never_sender() {
    let server = start().await;
    let mut a = TestClient::join(&server, "A").await;
    let mut b = TestClient::join(&server, "B").await;
    let mut c = TestClient::join(&server, "C").await;
    let mut d = TestClient::join(&server, "D").await;

    a.send(Message::group("A", ["A", "B", "C"], "team only")).await;

    assert_eq!(b.recv_chat().await.content, "team only");
    assert_eq!(c.recv_chat().await.content, "team only");
    b.expect_no_chat().await;
    c.expect_no_chat().await;
    a.expect_no_chat().await;
    d.expect_no_chat().await;
}

#[tokio::test]
async fn group_skips_offline_members() {
    let server = start().await;
    let mut a = TestClient::join(&server, "A").await;
    let mut c = TestClient::join(&server, "C").await;

    a.send(Message::group("A", ["ghost", "C"], "still here")).await;

    assert_eq!(c.recv_chat().await.content, "still here");
}

#[tokio::test]
async fn disconnect_is_dropped_from_user_list() {
    let server = start().await;
    let mut anna = TestClient::join(&server, "anna").await;
    let bob = TestClient::join(&server, "bob").await;

    anna.wait_for_users(|names| names.iter().any(|n| n == "bob")).await;
    drop(bob);

    let names = anna.wait_for_users(|names| !names.iter().any(|n| n == "bob")).await;
    assert_eq!(names, vec!["anna"]);
}

#[tokio::test]
async fn file_arrives_byte_identical() {
    let server = start().await;
    let mut anna = TestClient::join(&server, "anna").await;
    let mut bob = TestClient::join(&server, "bob").await;

    let payload: Vec<u8> = (0..300_000u32).map(|i| (i % 251) as u8).collect();
    let sent = Message::file("anna", "bob", "résumé (final).pdf", payload.clone());
    anna.send(sent.clone()).await;

    let got = bob.recv_chat().await;
    let file = got.file.as_ref().expect("file attachment");
    assert_eq!(got.id, sent.id);
    assert_eq!(got.msg_type, MessageType::File);
    assert_eq!(file.name, "résumé (final).pdf");
    assert_eq!(&file.payload[..], &payload[..]);
}

#[tokio::test]
async fn private_messages_keep_sender_order() {
    let server = start().await;
    let mut anna = TestClient::join(&server, "anna").await;
    let mut bob = TestClient::join(&server, "bob").await;

    const N: usize = 50;
    for i in 0..N {
        anna.send(Message::private("anna", "bob", i.to_string())).await;
    }

    for i in 0..N {
        assert_eq!(bob.recv_chat().await.content, i.to_string());
    }
    bob.expect_no_chat().await;
}

#[tokio::test]
async fn unrecognized_type_is_dropped_and_connection_survives() {
    let server = start().await;
    let mut anna = TestClient::join(&server, "anna").await;
    let mut bob = TestClient::join(&server, "bob").await;

    anna.send(Message::new(MessageType::Unrecognized(b'Z'), "anna", Some("bob".to_owned()), "??")).await;
    anna.send(Message::private("anna", "bob", "after")).await;

    let m = bob.recv_chat().await;
    assert_eq!(m.content, "after");
    assert_eq!(server.registry.len().await, 2);
}

#[tokio::test]
async fn confirm_read_and_inbound_user_list_are_not_routed() {
    let server = start().await;
    let mut anna = TestClient::join(&server, "anna").await;
    let mut bob = TestClient::join(&server, "bob").await;

    anna.send(Message::confirm_read("anna", "bob", "seen")).await;
    anna.send(Message::user_list(["fake"])).await;
    anna.send(Message::private("anna", "bob", "marker")).await;

    // one sender's records are dispatched in order, so anything routed
    // ahead of the marker would show up before it
    loop {
        let m = bob.recv().await;
        assert_ne!(m.msg_type, MessageType::ConfirmRead);
        assert!(!m.user_list_names().iter().any(|n| n == "fake"));
        if m.content == "marker" {
            break;
        }
    }
}

#[tokio::test]
async fn status_metadata_passes_through_untouched() {
    let server = start().await;
    let mut anna = TestClient::join(&server, "anna").await;
    let mut bob = TestClient::join(&server, "bob").await;

    let mut msg = Message::private("anna", "bob", "meta");
    msg.status = MessageStatus::Read;
    msg.delivered_time = Some(Utc::now());
    msg.read_time = Some(Utc::now());
    anna.send(msg.clone()).await;

    assert_eq!(bob.recv_chat().await, msg);
}

#[tokio::test]
async fn private_to_offline_user_is_silent() {
    let server = start().await;
    let mut anna = TestClient::join(&server, "anna").await;

    anna.send(Message::private("anna", "ghost", "hello?")).await;

    anna.expect_no_chat().await;
    assert_eq!(server.registry.len().await, 1);
}
