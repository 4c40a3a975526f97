use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use mazerun_core::net::messages::{
    ClientMessage, CreateRoomMsg, GameStartMsg, JoinMsg, PlayerJoinedMsg, ReadyMsg,
    RoomCreatedMsg, ServerMessage,
};
use mazerun_core::net::protocol::{
    PROTOCOL_VERSION, decode_server_message, encode_client_message,
};
use mazerun_server::build_app;
use mazerun_server::config::ServerConfig;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestServer {
    pub addr: SocketAddr,
    _server: tokio::task::JoinHandle<()>,
}

impl TestServer {
    /// Start a test server with the shared test config.
    pub async fn new() -> Self {
        Self::from_config(test_config()).await
    }

    pub async fn from_config(config: ServerConfig) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (app, _state) = build_app(config);
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        // give the server a moment to start accepting
        tokio::time::sleep(Duration::from_millis(20)).await;
        Self {
            addr,
            _server: handle,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub fn observe_url(&self, code: &str) -> String {
        format!("ws://{}/ws?observe={code}", self.addr)
    }
}

/// Small maze, two treasures, and a collect radius wide enough that spawn
/// positions can reach every treasure.
pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.maze.width = 15;
    config.maze.height = 15;
    config.maze.treasure_count = 2;
    config.maze.collect_radius = 1000.0;
    config
}

pub async fn ws_connect(url: &str) -> WsStream {
    let (stream, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    stream
}

pub async fn send_msg(stream: &mut WsStream, msg: &ClientMessage) {
    let text = encode_client_message(msg).unwrap();
    stream.send(Message::Text(text.into())).await.unwrap();
}

/// Read the next ServerMessage (5s timeout).
pub async fn read_msg(stream: &mut WsStream) -> ServerMessage {
    let deadline = Duration::from_secs(5);
    tokio::time::timeout(deadline, async {
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return decode_server_message(text.as_str()).unwrap();
                },
                Some(Ok(Message::Close(_))) => panic!("WebSocket closed unexpectedly"),
                Some(Err(e)) => panic!("WebSocket error: {e}"),
                None => panic!("WebSocket stream ended"),
                _ => continue,
            }
        }
    })
    .await
    .expect("timed out waiting for WebSocket message")
}

/// Try to read a ServerMessage, returning None on timeout.
pub async fn try_read_msg(stream: &mut WsStream, timeout_ms: u64) -> Option<ServerMessage> {
    tokio::time::timeout(Duration::from_millis(timeout_ms), async {
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return decode_server_message(text.as_str()).unwrap();
                },
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                    panic!("WebSocket error or closed")
                },
                _ => continue,
            }
        }
    })
    .await
    .ok()
}

/// Create a room; returns the room_created acknowledgment.
pub async fn create_room(stream: &mut WsStream, name: &str) -> RoomCreatedMsg {
    send_msg(
        stream,
        &ClientMessage::CreateRoom(CreateRoomMsg {
            player_name: name.to_string(),
            protocol_version: PROTOCOL_VERSION,
        }),
    )
    .await;
    match read_msg(stream).await {
        ServerMessage::RoomCreated(m) => m,
        other => panic!("expected room_created, got {other:?}"),
    }
}

/// Join a room; returns the personalized player_joined acknowledgment.
pub async fn join_room(stream: &mut WsStream, code: &str, name: &str) -> PlayerJoinedMsg {
    send_msg(
        stream,
        &ClientMessage::Join(JoinMsg {
            room_code: code.to_string(),
            player_name: name.to_string(),
            session_token: None,
            protocol_version: PROTOCOL_VERSION,
        }),
    )
    .await;
    match read_msg(stream).await {
        ServerMessage::PlayerJoined(m) => {
            assert!(m.self_id.is_some(), "join ack must carry self_id: {m:?}");
            m
        },
        other => panic!("expected player_joined ack, got {other:?}"),
    }
}

pub async fn send_ready(stream: &mut WsStream, ready: bool) {
    send_msg(stream, &ClientMessage::Ready(ReadyMsg { ready })).await;
}

/// Skip ready broadcasts until game_start arrives.
pub async fn read_until_game_start(stream: &mut WsStream) -> GameStartMsg {
    loop {
        match read_msg(stream).await {
            ServerMessage::GameStart(start) => return *start,
            ServerMessage::Ready(_) => continue,
            other => panic!("unexpected message before game_start: {other:?}"),
        }
    }
}

/// Create a room with host `H`, join `P`, ready both, and consume both
/// streams past game_start. Returns (host stream, host ack, peer stream,
/// peer ack, the start snapshot).
pub async fn start_two_player_game(
    server: &TestServer,
) -> (WsStream, RoomCreatedMsg, WsStream, PlayerJoinedMsg, GameStartMsg) {
    let mut host = ws_connect(&server.ws_url()).await;
    let created = create_room(&mut host, "H").await;

    let mut peer = ws_connect(&server.ws_url()).await;
    let joined = join_room(&mut peer, &created.room_code, "P").await;
    // host sees the join broadcast
    match read_msg(&mut host).await {
        ServerMessage::PlayerJoined(m) => assert_eq!(m.players.len(), 2),
        other => panic!("expected player_joined broadcast, got {other:?}"),
    }

    send_ready(&mut host, true).await;
    send_ready(&mut peer, true).await;
    let start_host = read_until_game_start(&mut host).await;
    let start_peer = read_until_game_start(&mut peer).await;
    assert_eq!(start_host, start_peer, "both clients must observe one identical start");

    (host, created, peer, joined, start_host)
}
