//! Realtime relay scenarios over real sockets.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use futures_util::{SinkExt, StreamExt};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tower::ServiceExt;

use movienight_api::state::{AppState, AppStateInner};
use movienight_api::tmdb::TmdbClient;
use movienight_db::Database;
use movienight_gateway::relay::Relay;
use movienight_server::build_app;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestServer {
    app: Router,
    addr: SocketAddr,
    _uploads: TempDir,
}

impl TestServer {
    async fn start() -> Self {
        let uploads = TempDir::new().unwrap();
        let state: AppState = Arc::new(AppStateInner {
            db: Arc::new(Database::open_in_memory().unwrap()),
            jwt_secret: "socket-test-secret".into(),
            relay: Relay::new(),
            tmdb: TmdbClient::new("http://127.0.0.1:1", ""),
            upload_dir: PathBuf::from(uploads.path()),
        });
        let app = build_app(state, None).unwrap();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let served = app.clone();
        tokio::spawn(async move {
            axum::serve(listener, served).await.unwrap();
        });

        Self {
            app,
            addr,
            _uploads: uploads,
        }
    }

    async fn rest(&self, method: Method, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let res = self
            .app
            .clone()
            .oneshot(builder.body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap();
        let status = res.status();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    /// Returns (token, user id).
    async fn signup(&self, name: &str) -> (String, String) {
        let (status, body) = self
            .rest(
                Method::POST,
                "/api/auth/signup",
                None,
                json!({ "username": name, "email": format!("{}@example.com", name), "password": "long enough pw" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        (
            body["token"].as_str().unwrap().to_string(),
            body["user"]["id"].as_str().unwrap().to_string(),
        )
    }

    async fn watchlist(&self, token: &str) -> String {
        let (status, body) = self
            .rest(
                Method::POST,
                "/api/watchlists",
                Some(token),
                json!({ "title": "Movie night", "visibility": "public" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_str().unwrap().to_string()
    }

    async fn connect(&self, token: Option<&str>) -> Socket {
        let url = match token {
            Some(token) => format!("ws://{}/socket?token={}", self.addr, token),
            None => format!("ws://{}/socket", self.addr),
        };
        let (socket, _) = connect_async(url).await.unwrap();
        socket
    }
}

async fn send(socket: &mut Socket, event: &str, data: Value) {
    let frame = json!({ "event": event, "data": data }).to_string();
    socket.send(Message::Text(frame.into())).await.unwrap();
}

/// Next JSON frame, skipping pings.
async fn recv(socket: &mut Socket) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for frame")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Assert nothing arrives for a short while.
async fn assert_silent(socket: &mut Socket) {
    let waited = tokio::time::timeout(Duration::from_millis(200), socket.next()).await;
    assert!(waited.is_err(), "unexpected frame: {:?}", waited);
}

async fn join(socket: &mut Socket, watchlist_id: &str, user_id: &str) -> Value {
    send(socket, "joinRoom", json!({ "watchlistId": watchlist_id, "userId": user_id })).await;
    let history = recv(socket).await;
    assert_eq!(history["event"], "chatHistory");
    history["data"].clone()
}

#[tokio::test]
async fn chat_reaches_whole_room_and_is_replayed_on_join() {
    let server = TestServer::start().await;
    let (token, _) = server.signup("host").await;
    let wl = server.watchlist(&token).await;

    let mut alice = server.connect(None).await;
    let mut bob = server.connect(None).await;

    assert_eq!(join(&mut alice, &wl, "alice-id").await, json!([]));
    join(&mut bob, &wl, "bob-id").await;

    let joined = recv(&mut alice).await;
    assert_eq!(joined, json!({ "event": "userJoined", "data": { "userId": "bob-id" } }));

    send(
        &mut bob,
        "chatMessage",
        json!({ "watchlistId": wl, "username": "Bob", "text": "popcorn ready" }),
    )
    .await;

    for socket in [&mut alice, &mut bob] {
        let msg = recv(socket).await;
        assert_eq!(msg["event"], "newMessage");
        assert_eq!(msg["data"]["text"], "popcorn ready");
        assert_eq!(msg["data"]["username"], "Bob");
        assert_eq!(msg["data"]["watchlistId"], wl.as_str());
    }

    // Blank messages are dropped
    send(&mut bob, "chatMessage", json!({ "watchlistId": wl, "text": "   " })).await;
    assert_silent(&mut alice).await;

    let mut carol = server.connect(None).await;
    let history = join(&mut carol, &wl, "carol-id").await;
    assert_eq!(history.as_array().unwrap().len(), 1);
    assert_eq!(history[0]["text"], "popcorn ready");
}

#[tokio::test]
async fn typing_goes_to_everyone_but_the_typist() {
    let server = TestServer::start().await;
    let mut alice = server.connect(None).await;
    let mut bob = server.connect(None).await;

    join(&mut alice, "room-1", "alice-id").await;
    join(&mut bob, "room-1", "bob-id").await;
    recv(&mut alice).await; // userJoined

    send(
        &mut bob,
        "typing",
        json!({ "watchlistId": "room-1", "userId": "bob-id", "username": "Bob", "isTyping": true }),
    )
    .await;

    let typing = recv(&mut alice).await;
    assert_eq!(
        typing,
        json!({ "event": "userTyping", "data": { "userId": "bob-id", "username": "Bob", "isTyping": true } })
    );
    assert_silent(&mut bob).await;
}

#[tokio::test]
async fn leaving_and_disconnecting_notify_the_room() {
    let server = TestServer::start().await;
    let mut alice = server.connect(None).await;
    let mut bob = server.connect(None).await;

    join(&mut alice, "room-2", "alice-id").await;
    join(&mut bob, "room-2", "bob-id").await;
    recv(&mut alice).await; // userJoined

    send(&mut bob, "leaveRoom", json!({ "watchlistId": "room-2", "userId": "bob-id" })).await;
    assert_eq!(
        recv(&mut alice).await,
        json!({ "event": "userLeft", "data": { "userId": "bob-id" } })
    );

    join(&mut bob, "room-2", "bob-id").await;
    recv(&mut alice).await; // userJoined

    bob.close(None).await.unwrap();
    drop(bob);
    assert_eq!(
        recv(&mut alice).await,
        json!({ "event": "userLeft", "data": { "userId": "bob-id" } })
    );
}

#[tokio::test]
async fn authenticated_socket_speaks_as_token_subject() {
    let server = TestServer::start().await;
    let (token, user_id) = server.signup("dana").await;
    let wl = server.watchlist(&token).await;

    let mut socket = server.connect(Some(&token)).await;
    join(&mut socket, &wl, "someone-else").await;

    send(
        &mut socket,
        "chatMessage",
        json!({ "watchlistId": wl, "userId": "spoofed", "username": "Mallory", "text": "hi" }),
    )
    .await;

    let msg = recv(&mut socket).await;
    assert_eq!(msg["event"], "newMessage");
    assert_eq!(msg["data"]["userId"], user_id.as_str());
    assert_eq!(msg["data"]["username"], "dana");
}

#[tokio::test]
async fn invalid_socket_token_is_rejected() {
    let server = TestServer::start().await;
    let url = format!("ws://{}/socket?token=not-a-token", server.addr);

    match connect_async(url).await {
        Err(tokio_tungstenite::tungstenite::Error::Http(res)) => {
            assert_eq!(res.status(), StatusCode::UNAUTHORIZED.as_u16());
        }
        other => panic!("expected 401, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn rest_changes_are_pushed_to_the_room() {
    let server = TestServer::start().await;
    let (token, _) = server.signup("erin").await;
    let wl = server.watchlist(&token).await;

    let mut socket = server.connect(None).await;
    join(&mut socket, &wl, "viewer").await;

    let (status, _) = server
        .rest(
            Method::PUT,
            &format!("/api/watchlists/{}/party", wl),
            Some(&token),
            json!({ "partyTime": "2031-07-04T21:00:00Z" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let event = recv(&mut socket).await;
    assert_eq!(event["event"], "partyTimeUpdated");
    assert!(event["data"]["partyTime"].as_str().unwrap().starts_with("2031-07-04T21:00:00"));

    server
        .rest(
            Method::POST,
            &format!("/api/watchlists/{}/movies", wl),
            Some(&token),
            json!({ "tmdbId": 27205, "title": "Inception" }),
        )
        .await;
    let event = recv(&mut socket).await;
    assert_eq!(event["event"], "newMovie");
    assert_eq!(event["data"]["tmdbId"], 27205);

    server
        .rest(Method::DELETE, &format!("/api/watchlists/{}/movies/27205", wl), Some(&token), Value::Null)
        .await;
    assert_eq!(
        recv(&mut socket).await,
        json!({ "event": "movieRemoved", "data": { "tmdbId": 27205 } })
    );
}

#[tokio::test]
async fn health_and_static_uploads_are_mounted() {
    let server = TestServer::start().await;
    let (status, body) = server.rest(Method::GET, "/api/health", None, Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, _) = server.rest(Method::GET, "/uploads/missing.png", None, Value::Null).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
