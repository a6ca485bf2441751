//! Pinecone store against a local server speaking the data-plane wire format.
#![cfg(feature = "pinecone")]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use ragchat_retrieval::pinecone::PineconeVectorStore;
use ragchat_retrieval::{Document, RagError, VectorStore, cosine_similarity};
use serde_json::{Value, json};

type Namespaces = Arc<Mutex<HashMap<String, HashMap<String, (Vec<f32>, Value)>>>>;

fn authorized(headers: &HeaderMap) -> bool {
    headers.get("api-key").and_then(|v| v.to_str().ok()) == Some("pc-test")
}

async fn upsert(
    State(namespaces): State<Namespaces>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "message": "Invalid API Key" })));
    }
    let namespace = body["namespace"].as_str().unwrap_or_default().to_string();
    let vectors = body["vectors"].as_array().cloned().unwrap_or_default();
    let mut namespaces = namespaces.lock().unwrap();
    let entries = namespaces.entry(namespace).or_default();
    for v in &vectors {
        let values: Vec<f32> = serde_json::from_value(v["values"].clone()).unwrap();
        entries.insert(v["id"].as_str().unwrap().to_string(), (values, v["metadata"].clone()));
    }
    (StatusCode::OK, Json(json!({ "upsertedCount": vectors.len() })))
}

async fn query(
    State(namespaces): State<Namespaces>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "message": "Invalid API Key" })));
    }
    assert_eq!(body["includeMetadata"], true);
    assert_eq!(body["includeValues"], true);
    let namespace = body["namespace"].as_str().unwrap_or_default();
    let top_k = body["topK"].as_u64().unwrap() as usize;
    let vector: Vec<f32> = serde_json::from_value(body["vector"].clone()).unwrap();

    let namespaces = namespaces.lock().unwrap();
    let mut matches: Vec<(f32, Value)> = namespaces
        .get(namespace)
        .into_iter()
        .flatten()
        .map(|(id, (values, metadata))| {
            let score = cosine_similarity(values, &vector).unwrap();
            (score, json!({ "id": id, "score": score, "values": values, "metadata": metadata }))
        })
        .collect();
    // Ascending, so the client has to rank the answer itself.
    matches.sort_by(|a, b| a.0.total_cmp(&b.0));
    let start = matches.len().saturating_sub(top_k);
    let matches: Vec<Value> = matches.split_off(start).into_iter().map(|(_, m)| m).collect();
    (StatusCode::OK, Json(json!({ "matches": matches, "namespace": namespace })))
}

async fn spawn_server() -> (String, tokio::task::JoinHandle<()>) {
    let app = Router::new()
        .route("/vectors/upsert", post(upsert))
        .route("/query", post(query))
        .with_state(Namespaces::default());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind test listener");
    let addr = listener.local_addr().expect("listener addr");
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server run");
    });
    (format!("http://{addr}"), handle)
}

#[tokio::test]
async fn upsert_then_query_round_trips_text_and_metadata() {
    let (host, handle) = spawn_server().await;
    let store = PineconeVectorStore::new(&host, "pc-test", "ns1").unwrap();

    store
        .insert(
            Document::new("doc_a", "Zomato share price rose 5%", vec![0.9, 0.1, 0.0])
                .with_metadata("source", "https://example.com/zomato"),
        )
        .await
        .unwrap();
    store
        .insert(Document::new("doc_b", "Weather forecast for tomorrow", vec![0.0, 0.1, 0.9]))
        .await
        .unwrap();

    let results = store.query(&[0.85, 0.2, 0.05], 3, 0.2).await.unwrap();
    assert_eq!(results.len(), 1);
    let top = &results[0];
    assert_eq!(top.document.id, "doc_a");
    assert_eq!(top.document.text, "Zomato share price rose 5%");
    assert_eq!(top.document.vector, vec![0.9, 0.1, 0.0]);
    assert_eq!(top.document.metadata.get("source").unwrap(), "https://example.com/zomato");
    assert!(!top.document.metadata.contains_key("text"));

    handle.abort();
}

#[tokio::test]
async fn results_are_ranked_locally() {
    let (host, handle) = spawn_server().await;
    let store = PineconeVectorStore::new(&host, "pc-test", "ns1").unwrap();
    for (id, vector) in [("x", vec![1.0, 0.0]), ("y", vec![1.0, 1.0]), ("z", vec![0.0, 1.0])] {
        store.insert(Document::new(id, id, vector)).await.unwrap();
    }

    let results = store.query(&[1.0, 0.2], 3, -1.0).await.unwrap();
    let ids: Vec<_> = results.iter().map(|r| r.document.id.as_str()).collect();
    assert_eq!(ids, ["x", "y", "z"]);

    handle.abort();
}

#[tokio::test]
async fn upsert_overwrites_existing_id() {
    let (host, handle) = spawn_server().await;
    let store = PineconeVectorStore::new(&host, "pc-test", "ns1").unwrap();
    store.insert(Document::new("a", "old", vec![1.0, 0.0])).await.unwrap();
    store.insert(Document::new("a", "new", vec![1.0, 0.0])).await.unwrap();

    let results = store.query(&[1.0, 0.0], 3, 0.2).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].document.text, "new");

    handle.abort();
}

#[tokio::test]
async fn namespaces_are_isolated() {
    let (host, handle) = spawn_server().await;
    let ns1 = PineconeVectorStore::new(&host, "pc-test", "ns1").unwrap();
    let ns2 = PineconeVectorStore::new(&host, "pc-test", "ns2").unwrap();
    ns1.insert(Document::new("a", "only in ns1", vec![1.0, 0.0])).await.unwrap();

    assert!(ns2.query(&[1.0, 0.0], 3, 0.2).await.unwrap().is_empty());
    assert_eq!(ns2.namespace(), "ns2");

    handle.abort();
}

#[tokio::test]
async fn reserved_text_metadata_key_is_rejected() {
    let (host, handle) = spawn_server().await;
    let store = PineconeVectorStore::new(&host, "pc-test", "ns1").unwrap();
    let document =
        Document::new("a", "the real text", vec![1.0, 0.0]).with_metadata("text", "caller value");

    let err = store.insert(document).await.unwrap_err();
    assert!(matches!(err, RagError::Validation(_)));
    assert!(store.query(&[1.0, 0.0], 3, -1.0).await.unwrap().is_empty());

    handle.abort();
}

#[tokio::test]
async fn rejected_key_is_store_unavailable() {
    let (host, handle) = spawn_server().await;
    let store = PineconeVectorStore::new(&host, "pc-wrong", "ns1").unwrap();
    let err = store.insert(Document::new("a", "text", vec![1.0])).await.unwrap_err();
    match err {
        RagError::StoreUnavailable { backend, message } => {
            assert_eq!(backend, "pinecone");
            assert!(message.contains("401"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    handle.abort();
}

#[test]
fn host_without_scheme_gets_https() {
    let store = PineconeVectorStore::new("index.svc.pinecone.io", "key", "ns1").unwrap();
    assert_eq!(store.backend(), "pinecone");
    assert!(format!("{store:?}").contains("https://index.svc.pinecone.io"));
}
