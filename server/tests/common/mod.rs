#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use futures::SinkExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;
use tokio_stream::StreamExt;
use tokio_util::codec::{FramedRead, FramedWrite};

use relay_protocol::{ChatCodec, ChatMsg, Message, MessageType};
use relay_server::{Registry, ServerConfig, ServerListener};

pub const WAIT: Duration = Duration::from_secs(5);
pub const QUIET: Duration = Duration::from_millis(300);

pub struct TestServer {
    pub addr: SocketAddr,
    pub registry: Registry,
}

pub async fn start() -> TestServer {
    start_with(ServerConfig::default()).await
}

pub async fn start_with(config: ServerConfig) -> TestServer {
    let listener = ServerListener::bind(config.with_addr("127.0.0.1:0")).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let registry = listener.registry();
    ServerListener::spawn_accept(listener);
    TestServer { addr, registry }
}

pub struct TestClient {
    pub name: String,
    fr: FramedRead<OwnedReadHalf, ChatCodec>,
    fw: FramedWrite<OwnedWriteHalf, ChatCodec>,
}

impl TestClient {
    pub async fn raw(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (r, w) = stream.into_split();
        TestClient {
            name: String::new(),
            fr: FramedRead::new(r, ChatCodec::new()),
            fw: FramedWrite::new(w, ChatCodec::new()),
        }
    }

    // connect, join and wait until our own name shows up in a user list
    pub async fn join(server: &TestServer, name: &str) -> Self {
        let mut c = TestClient::raw(server.addr).await;
        c.name = name.to_owned();
        c.send_frame(ChatMsg::Join(name.to_owned())).await;
        c.wait_for_users(|names| names.iter().any(|n| n == name)).await;
        c
    }

    pub async fn send_frame(&mut self, frame: ChatMsg) {
        self.fw.send(frame).await.unwrap();
    }

    pub async fn send(&mut self, msg: Message) {
        self.send_frame(ChatMsg::Record(msg)).await;
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.fw.get_mut().write_all(bytes).await.unwrap();
    }

    // half close, the server sees end of stream while our read side stays open
    pub async fn shutdown_write(&mut self) {
        self.fw.get_mut().shutdown().await.unwrap();
    }

    pub async fn next_frame(&mut self) -> Option<std::io::Result<ChatMsg>> {
        timeout(WAIT, self.fr.next()).await.expect("timed out waiting for frame")
    }

    pub async fn recv(&mut self) -> Message {
        match self.next_frame().await {
            Some(Ok(ChatMsg::Record(m))) => m,
            other => panic!("{}: expected record, got {:?}", self.name, other),
        }
    }

    /// Next message that is not a presence update.
    pub async fn recv_chat(&mut self) -> Message {
        loop {
            let m = self.recv().await;
            if m.msg_type != MessageType::UserList {
                return m;
            }
        }
    }

    pub async fn wait_for_users<F>(&mut self, pred: F) -> Vec<String>
    where
        F: Fn(&[String]) -> bool,
    {
        loop {
            let m = self.recv().await;
            if m.msg_type == MessageType::UserList {
                let names = m.user_list_names();
                if pred(&names) {
                    return names;
                }
            }
        }
    }

    /// Asserts nothing but presence updates arrive for a short while.
    pub async fn expect_no_chat(&mut self) {
        loop {
            match timeout(QUIET, self.fr.next()).await {
                Err(_) => return,
                Ok(Some(Ok(ChatMsg::Record(m)))) if m.msg_type == MessageType::UserList => continue,
                Ok(other) => panic!("{}: expected silence, got {:?}", self.name, other),
            }
        }
    }

    /// Reads until the server closes the connection, counting non presence records.
    pub async fn count_until_closed(&mut self) -> usize {
        let mut n = 0;
        loop {
            match self.next_frame().await {
                Some(Ok(ChatMsg::Record(m))) if m.msg_type != MessageType::UserList => n += 1,
                Some(Ok(_)) => continue,
                None | Some(Err(_)) => return n,
            }
        }
    }

    /// True once the server has closed the connection.
    pub async fn is_closed_by_server(&mut self) -> bool {
        loop {
            match timeout(WAIT, self.fr.next()).await {
                Ok(None) | Ok(Some(Err(_))) => return true,
                Ok(Some(Ok(_))) => continue,
                Err(_) => return false,
            }
        }
    }
}
