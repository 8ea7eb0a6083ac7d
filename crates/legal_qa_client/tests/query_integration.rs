//! Integration tests for the single-exchange path and the conversation
//! endpoints, against a minimal in-process axum server (no mocks).

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use legal_qa_client::{QueryClient, QueryError, QueryRequest};
use serde_json::{json, Value};

async fn spawn_server(app: Router) -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    port
}

fn client_for(port: u16) -> QueryClient {
    QueryClient::new(
        format!("http://127.0.0.1:{}", port),
        Duration::from_secs(5),
    )
    .expect("client should build")
}

#[tokio::test]
async fn send_once_returns_response_sources_and_metadata() {
    // Record the body the backend received so the contract can be checked.
    let seen: Arc<Mutex<Option<Value>>> = Arc::new(Mutex::new(None));
    let app = Router::new()
        .route(
            "/query",
            post(
                |State(seen): State<Arc<Mutex<Option<Value>>>>, Json(body): Json<Value>| async move {
                    *seen.lock().unwrap() = Some(body);
                    Json(json!({
                        "response": "Under Section 50, you have the right to remain silent.",
                        "metadata": {
                            "model": "gpt-3.5-turbo",
                            "strategy": "hybrid",
                            "num_chunks": 3,
                            "tokens_used": 128,
                            "processing_time": 0.8,
                            "conversation_id": "c-42"
                        },
                        "context_sources": [
                            {"title": "Criminal Procedure Act", "url": "https://law.example/cpa", "snippet": "Section 50..."}
                        ]
                    }))
                },
            ),
        )
        .with_state(seen.clone());
    let port = spawn_server(app).await;

    let client = client_for(port);
    let mut request = QueryRequest::new("What are my rights if arrested?", "gpt-3.5-turbo");
    request.stream = true; // must be forced off by send_once
    let reply = client.send_once(&request).await.expect("query should succeed");

    assert!(reply.response.starts_with("Under Section 50"));
    assert_eq!(reply.context_sources.len(), 1);
    assert_eq!(reply.context_sources[0].title, "Criminal Procedure Act");
    let metadata = reply.metadata.unwrap();
    assert_eq!(metadata.conversation_id.as_deref(), Some("c-42"));
    assert_eq!(metadata.num_chunks, 3);

    let body = seen.lock().unwrap().clone().unwrap();
    assert_eq!(body["query"], "What are my rights if arrested?");
    assert_eq!(body["model"], "gpt-3.5-turbo");
    assert_eq!(body["stream"], false);
}

#[tokio::test]
async fn send_once_maps_non_success_to_api_error() {
    let app = Router::new().route(
        "/query",
        post(|| async {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({"message": "unknown model", "code": "invalid_model"})),
            )
        }),
    );
    let port = spawn_server(app).await;

    let client = client_for(port);
    let request = QueryRequest::new("q", "no-such-model");
    match client.send_once(&request).await {
        Err(QueryError::Api {
            message,
            code,
            status,
        }) => {
            assert_eq!(message, "unknown model");
            assert_eq!(code.as_deref(), Some("invalid_model"));
            assert_eq!(status, 400);
        }
        other => panic!("expected Api error, got {:?}", other),
    }
}

#[tokio::test]
async fn send_once_without_error_body_uses_generic_message() {
    let app = Router::new().route(
        "/query",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
    );
    let port = spawn_server(app).await;

    let client = client_for(port);
    let request = QueryRequest::new("q", "gpt-3.5-turbo");
    match client.send_once(&request).await {
        Err(QueryError::Api {
            message, status, ..
        }) => {
            assert_eq!(message, "An error occurred");
            assert_eq!(status, 500);
        }
        other => panic!("expected Api error, got {:?}", other),
    }
}

#[tokio::test]
async fn send_once_rejects_unparseable_body() {
    let app = Router::new().route("/query", post(|| async { "this is not the shape" }));
    let port = spawn_server(app).await;

    let client = client_for(port);
    let request = QueryRequest::new("q", "gpt-3.5-turbo");
    assert!(matches!(
        client.send_once(&request).await,
        Err(QueryError::MalformedResponse(_))
    ));
}

#[tokio::test]
async fn send_once_reports_network_error_when_server_is_down() {
    // Bind then drop to find a port nothing listens on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let client = client_for(port);
    let request = QueryRequest::new("q", "gpt-3.5-turbo");
    assert!(matches!(
        client.send_once(&request).await,
        Err(QueryError::Network(_))
    ));
}

#[derive(Clone, Default)]
struct ConversationState {
    deleted: Arc<Mutex<Vec<String>>>,
    removed_indices: Arc<Mutex<Vec<usize>>>,
}

fn conversation_app(state: ConversationState) -> Router {
    Router::new()
        .route(
            "/conversation/:id",
            get(|Path(id): Path<String>| async move {
                Json(json!({
                    "conversation_id": id,
                    "messages": [
                        {"role": "user", "content": "What are my rights if arrested?"},
                        {"role": "assistant", "content": "Under Section 50..."}
                    ]
                }))
            })
            .delete(
                |State(state): State<ConversationState>, Path(id): Path<String>| async move {
                    state.deleted.lock().unwrap().push(id);
                    StatusCode::NO_CONTENT
                },
            ),
        )
        .route(
            "/conversation/:id/message/:index",
            delete(
                |State(state): State<ConversationState>,
                 Path((_id, index)): Path<(String, usize)>| async move {
                    state.removed_indices.lock().unwrap().push(index);
                    StatusCode::NO_CONTENT
                },
            ),
        )
        .route(
            "/conversation/:id/messages",
            delete(
                |State(state): State<ConversationState>,
                 Path(_id): Path<String>,
                 Json(indices): Json<Vec<usize>>| async move {
                    state.removed_indices.lock().unwrap().extend(indices);
                    StatusCode::NO_CONTENT
                },
            ),
        )
        .with_state(state)
}

#[tokio::test]
async fn conversation_history_roundtrip() {
    let state = ConversationState::default();
    let port = spawn_server(conversation_app(state)).await;

    let client = client_for(port);
    let history = client
        .get_conversation("c-42")
        .await
        .expect("get_conversation should succeed");
    assert_eq!(history.conversation_id, "c-42");
    assert_eq!(history.messages.len(), 2);
    assert_eq!(history.messages[0].role, "user");
    assert_eq!(history.messages[1].role, "assistant");
}

#[tokio::test]
async fn conversation_deletes_hit_the_expected_routes() {
    let state = ConversationState::default();
    let port = spawn_server(conversation_app(state.clone())).await;

    let client = client_for(port);
    client.delete_conversation("c-42").await.unwrap();
    client.delete_message("c-42", 3).await.unwrap();
    client.delete_messages("c-42", &[0, 2, 5]).await.unwrap();

    assert_eq!(state.deleted.lock().unwrap().as_slice(), ["c-42"]);
    assert_eq!(state.removed_indices.lock().unwrap().as_slice(), [3, 0, 2, 5]);
}
