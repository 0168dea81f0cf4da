use std::sync::Arc;
use std::time::Duration;

use huddle_protocol::{Packet, ProtocolError, UserEntry};
use huddle_server::config::{MAX_CHAT_MESSAGE_LEN, MAX_SIGNAL_PAYLOAD_LEN};
use huddle_server::RelayServer;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// Test client wrapper that handles framed packet I/O.
struct TestClient {
    socket: TcpStream,
    buffer: Vec<u8>,
}

impl TestClient {
    async fn connect(addr: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = TcpStream::connect(addr).await?;
        Ok(TestClient {
            socket,
            buffer: Vec::new(),
        })
    }

    async fn send_packet(&mut self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        self.socket.write_all(&packet.encode()).await?;
        self.socket.flush().await?;
        Ok(())
    }

    async fn recv_packet(&mut self) -> Result<Packet, Box<dyn std::error::Error>> {
        let mut read_buf = [0u8; 4096];
        loop {
            match Packet::decode(&self.buffer) {
                Ok((packet, size)) => {
                    self.buffer.drain(..size);
                    return Ok(packet);
                }
                Err(ProtocolError::PacketTooShort { .. })
                | Err(ProtocolError::IncompletePayload { .. }) => {
                    let n = timeout(RECV_TIMEOUT, self.socket.read(&mut read_buf)).await??;
                    if n == 0 {
                        return Err("connection closed".into());
                    }
                    self.buffer.extend_from_slice(&read_buf[..n]);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Asserts that nothing arrives within the given window.
    async fn expect_silence(&mut self, window: Duration) {
        let result = timeout(window, self.recv_packet()).await;
        assert!(result.is_err(), "expected silence, got {result:?}");
    }

    /// Round-trips a ping so that every packet sent before it is known
    /// to have been processed by this client's handler.
    async fn barrier(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.send_packet(&Packet::Ping { nonce: 0 }).await?;
        match self.recv_packet().await? {
            Packet::Pong { nonce: 0 } => Ok(()),
            other => Err(format!("expected Pong, got {other:?}").into()),
        }
    }

    async fn join(&mut self, display_name: &str) -> Result<(), Box<dyn std::error::Error>> {
        self.send_packet(&Packet::Join {
            display_name: display_name.to_string(),
        })
        .await
    }

    /// Joins and returns the member list from the resulting snapshot.
    async fn join_and_list(
        &mut self,
        display_name: &str,
    ) -> Result<Vec<UserEntry>, Box<dyn std::error::Error>> {
        self.join(display_name).await?;
        match self.recv_packet().await? {
            Packet::UserList { users } => Ok(users),
            other => Err(format!("expected UserList, got {other:?}").into()),
        }
    }
}

fn id_of(users: &[UserEntry], name: &str) -> u64 {
    users
        .iter()
        .find(|u| u.display_name == name)
        .unwrap_or_else(|| panic!("{name} not in list"))
        .id
}

async fn start_server() -> String {
    let server = Arc::new(RelayServer::new());
    let addr = server
        .bind("127.0.0.1:0")
        .await
        .expect("failed to start server");
    addr.to_string()
}

#[tokio::test]
async fn join_returns_member_snapshot() {
    let addr = start_server().await;
    let mut client = TestClient::connect(&addr).await.expect("connect");

    let users = client.join_and_list("alice").await.expect("join");
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].display_name, "alice");
}

#[tokio::test]
async fn second_join_is_announced_to_first() {
    let addr = start_server().await;

    let mut alice = TestClient::connect(&addr).await.expect("connect alice");
    let users = alice.join_and_list("alice").await.expect("join alice");
    assert_eq!(users.len(), 1);

    let mut bob = TestClient::connect(&addr).await.expect("connect bob");
    let users = bob.join_and_list("bob").await.expect("join bob");
    assert_eq!(users.len(), 2);

    // Alice sees the announcement followed by the refreshed snapshot.
    let pkt = alice.recv_packet().await.expect("user joined");
    match pkt {
        Packet::UserJoined { user } => assert_eq!(user.display_name, "bob"),
        other => panic!("expected UserJoined, got {other:?}"),
    }
    let pkt = alice.recv_packet().await.expect("user list");
    match pkt {
        Packet::UserList { users } => assert_eq!(users.len(), 2),
        other => panic!("expected UserList, got {other:?}"),
    }

    // Bob gets no self-announcement beyond the snapshot.
    bob.expect_silence(Duration::from_millis(200)).await;
}

#[tokio::test]
async fn invalid_display_name_is_rejected_without_registration() {
    let addr = start_server().await;
    let mut client = TestClient::connect(&addr).await.expect("connect");

    client.join("").await.expect("send join");
    let pkt = client.recv_packet().await.expect("error");
    assert!(matches!(pkt, Packet::Error { .. }));

    // The connection survives and a valid join still works.
    let users = client.join_and_list("alice").await.expect("join");
    assert_eq!(users.len(), 1);
}

#[tokio::test]
async fn concurrent_joins_converge_on_complete_user_list() {
    let addr = start_server().await;

    let mut observer = TestClient::connect(&addr).await.expect("connect");
    observer.join_and_list("observer").await.expect("join");

    let mut others = Vec::new();
    for name in ["bea", "cal", "dot", "eli"] {
        let mut client = TestClient::connect(&addr).await.expect("connect");
        client.join(name).await.expect("join");
        others.push(client);
    }

    // Each join publishes its announcement and snapshot back to back,
    // so the observer sees strict pairs and the final snapshot reflects
    // every join that happened, however the handlers interleaved.
    let mut last_list = Vec::new();
    for _ in 0..4 {
        let pkt = observer.recv_packet().await.expect("user joined");
        assert!(matches!(pkt, Packet::UserJoined { .. }));
        match observer.recv_packet().await.expect("user list") {
            Packet::UserList { users } => last_list = users,
            other => panic!("expected UserList, got {other:?}"),
        }
    }
    assert_eq!(last_list.len(), 5);
}

#[tokio::test]
async fn voice_join_before_presence_join_is_rejected() {
    let addr = start_server().await;
    let mut client = TestClient::connect(&addr).await.expect("connect");

    client
        .send_packet(&Packet::JoinVoiceChannel {
            channel: "general".to_string(),
        })
        .await
        .expect("send voice join");
    let pkt = client.recv_packet().await.expect("rejection");
    assert!(matches!(pkt, Packet::Error { .. }));
}

#[tokio::test]
async fn oversized_frames_are_rejected_without_dropping_the_connection() {
    let addr = start_server().await;
    let mut client = TestClient::connect(&addr).await.expect("connect");
    client.join_and_list("alice").await.expect("join");

    client
        .send_packet(&Packet::ChatMessage {
            message: "m".repeat(MAX_CHAT_MESSAGE_LEN + 1),
        })
        .await
        .expect("send chat");
    let pkt = client.recv_packet().await.expect("chat rejection");
    assert!(matches!(pkt, Packet::Error { .. }));

    client
        .send_packet(&Packet::WebrtcOffer {
            target_id: 1,
            payload: vec![0u8; MAX_SIGNAL_PAYLOAD_LEN + 1],
        })
        .await
        .expect("send offer");
    let pkt = client.recv_packet().await.expect("offer rejection");
    assert!(matches!(pkt, Packet::Error { .. }));

    // The connection survives and normal traffic still flows.
    client
        .send_packet(&Packet::ChatMessage {
            message: "still here".to_string(),
        })
        .await
        .expect("send chat");
    let pkt = client.recv_packet().await.expect("chat broadcast");
    assert!(matches!(pkt, Packet::ChatBroadcast { .. }));
}

#[tokio::test]
async fn chat_is_stamped_and_broadcast_to_sender_too() {
    let addr = start_server().await;
    let mut client = TestClient::connect(&addr).await.expect("connect");
    client.join_and_list("alice").await.expect("join");

    client
        .send_packet(&Packet::ChatMessage {
            message: "hello there".to_string(),
        })
        .await
        .expect("send chat");

    let pkt = client.recv_packet().await.expect("chat broadcast");
    match pkt {
        Packet::ChatBroadcast {
            sender,
            timestamp,
            message,
        } => {
            assert_eq!(sender.display_name, "alice");
            assert_eq!(message, "hello there");
            assert!(timestamp > 0);
        }
        other => panic!("expected ChatBroadcast, got {other:?}"),
    }
}

#[tokio::test]
async fn offer_answer_candidate_flow_between_channel_members() {
    let addr = start_server().await;

    let mut alice = TestClient::connect(&addr).await.expect("connect alice");
    alice.join_and_list("alice").await.expect("join alice");

    let mut bob = TestClient::connect(&addr).await.expect("connect bob");
    let users = bob.join_and_list("bob").await.expect("join bob");
    let alice_id = id_of(&users, "alice");
    let bob_id = id_of(&users, "bob");

    // Drain bob's presence announcement at alice.
    alice.recv_packet().await.expect("user joined");
    alice.recv_packet().await.expect("user list");

    alice
        .send_packet(&Packet::JoinVoiceChannel {
            channel: "general".to_string(),
        })
        .await
        .expect("alice voice join");
    alice.barrier().await.expect("alice join processed");
    bob.send_packet(&Packet::JoinVoiceChannel {
        channel: "general".to_string(),
    })
    .await
    .expect("bob voice join");

    let pkt = alice.recv_packet().await.expect("bob joined voice");
    match pkt {
        Packet::UserJoinedVoice { user } => assert_eq!(user.id, bob_id),
        other => panic!("expected UserJoinedVoice, got {other:?}"),
    }

    alice
        .send_packet(&Packet::WebrtcOffer {
            target_id: bob_id,
            payload: b"offer-sdp".to_vec(),
        })
        .await
        .expect("send offer");

    let pkt = bob.recv_packet().await.expect("relayed offer");
    match pkt {
        Packet::OfferRelayed { sender, payload } => {
            assert_eq!(sender.id, alice_id);
            assert_eq!(sender.display_name, "alice");
            assert_eq!(payload, b"offer-sdp");
        }
        other => panic!("expected OfferRelayed, got {other:?}"),
    }

    bob.send_packet(&Packet::WebrtcAnswer {
        target_id: alice_id,
        payload: b"answer-sdp".to_vec(),
    })
    .await
    .expect("send answer");

    let pkt = alice.recv_packet().await.expect("relayed answer");
    match pkt {
        Packet::AnswerRelayed { sender_id, payload } => {
            assert_eq!(sender_id, bob_id);
            assert_eq!(payload, b"answer-sdp");
        }
        other => panic!("expected AnswerRelayed, got {other:?}"),
    }

    bob.send_packet(&Packet::WebrtcIceCandidate {
        target_id: alice_id,
        payload: b"candidate".to_vec(),
    })
    .await
    .expect("send candidate");

    let pkt = alice.recv_packet().await.expect("relayed candidate");
    assert!(matches!(pkt, Packet::IceCandidateRelayed { sender_id, .. } if sender_id == bob_id));
}

#[tokio::test]
async fn offer_outside_shared_channel_errors_sender_only() {
    let addr = start_server().await;

    let mut alice = TestClient::connect(&addr).await.expect("connect alice");
    alice.join_and_list("alice").await.expect("join alice");

    let mut bob = TestClient::connect(&addr).await.expect("connect bob");
    let users = bob.join_and_list("bob").await.expect("join bob");
    let bob_id = id_of(&users, "bob");

    alice.recv_packet().await.expect("user joined");
    alice.recv_packet().await.expect("user list");

    // Bob is alone in a channel; alice is in none.
    bob.send_packet(&Packet::JoinVoiceChannel {
        channel: "x".to_string(),
    })
    .await
    .expect("bob voice join");

    alice
        .send_packet(&Packet::WebrtcOffer {
            target_id: bob_id,
            payload: b"offer-sdp".to_vec(),
        })
        .await
        .expect("send offer");

    let pkt = alice.recv_packet().await.expect("rejection");
    assert!(matches!(pkt, Packet::Error { .. }));
    bob.expect_silence(Duration::from_millis(200)).await;
}

#[tokio::test]
async fn disconnect_notifies_voice_peers_and_presence() {
    let addr = start_server().await;

    let mut alice = TestClient::connect(&addr).await.expect("connect alice");
    alice.join_and_list("alice").await.expect("join alice");

    let mut bob = TestClient::connect(&addr).await.expect("connect bob");
    let users = bob.join_and_list("bob").await.expect("join bob");
    let alice_id = id_of(&users, "alice");
    let bob_id = id_of(&users, "bob");

    alice.recv_packet().await.expect("user joined");
    alice.recv_packet().await.expect("user list");

    alice
        .send_packet(&Packet::JoinVoiceChannel {
            channel: "general".to_string(),
        })
        .await
        .expect("alice voice join");
    alice.barrier().await.expect("alice join processed");
    bob.send_packet(&Packet::JoinVoiceChannel {
        channel: "general".to_string(),
    })
    .await
    .expect("bob voice join");
    alice.recv_packet().await.expect("bob joined voice");

    // Bob drops the connection abruptly.
    drop(bob);

    let pkt = alice.recv_packet().await.expect("left voice");
    assert!(matches!(pkt, Packet::UserLeftVoice { user } if user.id == bob_id));

    let pkt = alice.recv_packet().await.expect("voice user list");
    match pkt {
        Packet::VoiceUserList { channel, members } => {
            assert_eq!(channel, "general");
            assert_eq!(members, vec![UserEntry::new(alice_id, "alice")]);
        }
        other => panic!("expected VoiceUserList, got {other:?}"),
    }

    let pkt = alice.recv_packet().await.expect("user disconnected");
    assert!(matches!(pkt, Packet::UserDisconnected { user } if user.id == bob_id));

    let pkt = alice.recv_packet().await.expect("user list");
    match pkt {
        Packet::UserList { users } => {
            assert_eq!(users, vec![UserEntry::new(alice_id, "alice")]);
        }
        other => panic!("expected UserList, got {other:?}"),
    }
}

#[tokio::test]
async fn ping_is_answered_immediately() {
    let addr = start_server().await;
    let mut client = TestClient::connect(&addr).await.expect("connect");

    client
        .send_packet(&Packet::Ping { nonce: 77 })
        .await
        .expect("send ping");
    let pkt = client.recv_packet().await.expect("pong");
    assert_eq!(pkt, Packet::Pong { nonce: 77 });
}
