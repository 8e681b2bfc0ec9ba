//! HTTP API for meshkv.
//!
//! Translates REST verbs into typed requests against the cluster
//! server and envelopes back into HTTP:
//!
//! | Route | Request |
//! |-------|---------|
//! | `GET /v1/keys` | keys of the serving node |
//! | `GET /v1/keys/:key` | load |
//! | `PUT /v1/keys/:key` | store |
//! | `DELETE /v1/keys/:key` | delete |
//! | `GET /v1/keys/:key/index?index=N` | list element |
//! | `GET /v1/keys/:key/item?item=X` | dictionary entry |
//! | `GET /v1/nodes` | cluster members |

pub mod dto;

use axum::extract::{Extension, Path, Query};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response as HttpResponse};
use axum::routing::get;
use axum::{Json, Router};
use dto::{ErrorDto, IndexQuery, ItemQuery, NodeDto, ResponseDto, StoreBody};
use meshkv_server::{Response, Server};
use meshkv_store::{Request, Value};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// Build the API router over a started cluster server.
pub fn router(server: Arc<Server>) -> Router {
    Router::new()
        .route("/v1/keys", get(keys_handler))
        .route(
            "/v1/keys/:key",
            get(load_handler).put(store_handler).delete(delete_handler),
        )
        .route("/v1/keys/:key/index", get(index_handler))
        .route("/v1/keys/:key/item", get(item_handler))
        .route("/v1/nodes", get(nodes_handler))
        .layer(Extension(server))
}

/// Bind `addr` and serve the API until the process exits.
pub async fn serve(addr: &str, server: Arc<Server>) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr, "http api listening");
    axum::serve(listener, router(server)).await
}

fn http_status(status: u16) -> StatusCode {
    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Envelope-to-HTTP translation shared by all record handlers.
fn respond(action: &str, resp: Response, with_data: bool) -> HttpResponse {
    if resp.is_err() {
        error!(action, status = resp.status, error = %resp.error, "request failed");
        let body = ErrorDto {
            text: resp.error.clone(),
        };
        return (http_status(resp.status), Json(body)).into_response();
    }
    let body = ResponseDto::new(action, &resp, with_data);
    (StatusCode::OK, Json(body)).into_response()
}

async fn keys_handler(Extension(server): Extension<Arc<Server>>) -> HttpResponse {
    let req = Request::Keys {
        id: Uuid::new_v4().to_string(),
    };
    let resp = server.do_request(&req).await;
    if resp.is_err() {
        let body = ErrorDto {
            text: resp.error.clone(),
        };
        return (http_status(resp.status), Json(body)).into_response();
    }

    // The synthetic record holds the key sequence; clients get a bare
    // array.
    let keys: Vec<String> = match resp.record.data {
        Value::List(items) => items
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };
    (StatusCode::OK, Json(keys)).into_response()
}

async fn load_handler(
    Extension(server): Extension<Arc<Server>>,
    Path(key): Path<String>,
) -> HttpResponse {
    let req = Request::Load {
        id: Uuid::new_v4().to_string(),
        key,
    };
    respond("load", server.do_request(&req).await, true)
}

async fn store_handler(
    Extension(server): Extension<Arc<Server>>,
    Path(key): Path<String>,
    Json(body): Json<StoreBody>,
) -> HttpResponse {
    let expire_time = match body.expire_time.as_deref() {
        None | Some("") => 0,
        Some(raw) => match dto::parse_expire_time(raw) {
            Ok(ms) => ms,
            Err(err) => {
                let body = ErrorDto {
                    text: format!("invalid expire_time {:?}: {}", raw, err),
                };
                return (StatusCode::BAD_REQUEST, Json(body)).into_response();
            }
        },
    };

    let req = Request::Store {
        id: Uuid::new_v4().to_string(),
        key,
        data: body.data,
        expire_time,
    };
    respond("store", server.do_request(&req).await, true)
}

async fn delete_handler(
    Extension(server): Extension<Arc<Server>>,
    Path(key): Path<String>,
) -> HttpResponse {
    let req = Request::Delete {
        id: Uuid::new_v4().to_string(),
        key,
    };
    respond("delete", server.do_request(&req).await, false)
}

async fn index_handler(
    Extension(server): Extension<Arc<Server>>,
    Path(key): Path<String>,
    Query(query): Query<IndexQuery>,
) -> HttpResponse {
    let req = Request::ListIndex {
        id: Uuid::new_v4().to_string(),
        key,
        index: query.index,
    };
    respond("index", server.do_request(&req).await, true)
}

async fn item_handler(
    Extension(server): Extension<Arc<Server>>,
    Path(key): Path<String>,
    Query(query): Query<ItemQuery>,
) -> HttpResponse {
    let req = Request::DictItem {
        id: Uuid::new_v4().to_string(),
        key,
        item: dto::parse_item(&query.item),
    };
    respond("item", server.do_request(&req).await, true)
}

async fn nodes_handler(Extension(server): Extension<Arc<Server>>) -> HttpResponse {
    let nodes: Vec<NodeDto> = server
        .nodes()
        .iter()
        .map(|peer| NodeDto::from(&peer.info))
        .collect();
    (StatusCode::OK, Json(nodes)).into_response()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use meshkv_server::Config;

    async fn start_node(port: u16) -> Arc<Server> {
        let server = Server::new(Config {
            local_addr: format!("127.0.0.1:{}", port),
            neighbors: Vec::new(),
            partitions: 64,
            dial_retries: 0,
            tls: None,
        });
        server.start().await.expect("node start");
        server
    }

    #[tokio::test]
    async fn test_store_load_delete_handlers() {
        let server = start_node(18200).await;

        let resp = store_handler(
            Extension(server.clone()),
            Path("k".to_string()),
            Json(StoreBody {
                data: Value::Int(42),
                expire_time: Some("10s".to_string()),
            }),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = load_handler(Extension(server.clone()), Path("k".to_string())).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = delete_handler(Extension(server.clone()), Path("k".to_string())).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = load_handler(Extension(server.clone()), Path("k".to_string())).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        server.stop().await;
    }

    #[tokio::test]
    async fn test_store_rejects_bad_expire_time() {
        let server = start_node(18201).await;

        let resp = store_handler(
            Extension(server.clone()),
            Path("k".to_string()),
            Json(StoreBody {
                data: Value::Int(1),
                expire_time: Some("soon".to_string()),
            }),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        server.stop().await;
    }

    #[tokio::test]
    async fn test_index_and_item_handlers_map_conflicts() {
        let server = start_node(18202).await;

        let list = Value::List(vec![Value::Int(1), Value::Int(2)]);
        let resp = store_handler(
            Extension(server.clone()),
            Path("L".to_string()),
            Json(StoreBody {
                data: list,
                expire_time: None,
            }),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = index_handler(
            Extension(server.clone()),
            Path("L".to_string()),
            Query(IndexQuery { index: 1 }),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = index_handler(
            Extension(server.clone()),
            Path("L".to_string()),
            Query(IndexQuery { index: 9 }),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let resp = item_handler(
            Extension(server.clone()),
            Path("L".to_string()),
            Query(ItemQuery {
                item: "3".to_string(),
            }),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        server.stop().await;
    }

    #[tokio::test]
    async fn test_nodes_handler_lists_self() {
        let server = start_node(18203).await;

        let resp = nodes_handler(Extension(server.clone())).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(server.nodes().len(), 1);

        server.stop().await;
    }
}
