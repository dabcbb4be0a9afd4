//! HTTP API routes and error contract.

mod common;

use serde_json::{json, Value};
use std::time::Duration;
use tempfile::TempDir;

use common::{app_with_ollama, minimal_docx, mock_ollama, EMBED_MODEL};
use docrag::server;

async fn serve(app: docrag::app::App) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, server::router(app)).await.ok();
    });
    format!("http://{}", addr)
}

async fn wait_for_completion(client: &reqwest::Client, base: &str, document_id: &str) -> Value {
    let url = format!("{}/documents/{}/status", base, document_id);
    for _ in 0..50 {
        let body: Value = client.get(&url).send().await.unwrap().json().await.unwrap();
        if body["task"]["state"] == "completed" {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("document {} did not finish ingesting within 5 seconds", document_id);
}

#[tokio::test]
async fn test_routes_end_to_end() {
    let ollama = mock_ollama().await;
    let tmp = TempDir::new().unwrap();
    let (app, provider_id) = app_with_ollama(&tmp, &ollama).await;
    let base = serve(app).await;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("{}/health", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");

    let providers: Value = client
        .get(format!("{}/providers", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(providers[0]["name"], "ollama");
    assert!(providers[0].get("credential").is_none());

    let test = client
        .post(format!("{}/providers/{}/test", base, provider_id))
        .send()
        .await
        .unwrap();
    assert_eq!(test.status(), 200);
    let test: Value = test.json().await.unwrap();
    assert_eq!(test["success"], true);

    let models: Value = client
        .post(format!("{}/providers/{}/refresh", base, provider_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(models[0]["modelId"], EMBED_MODEL);

    let create = json!({
        "name": "handbook",
        "chunkSize": 100,
        "chunkOverlap": 10,
        "embeddingProviderId": provider_id,
        "embeddingModelId": EMBED_MODEL
    });
    let resp = client
        .post(format!("{}/collections", base))
        .json(&create)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let collection: Value = resp.json().await.unwrap();
    let collection_id = collection["id"].as_str().unwrap().to_string();

    let dup = client
        .post(format!("{}/collections", base))
        .json(&create)
        .send()
        .await
        .unwrap();
    assert_eq!(dup.status(), 409);
    let dup: Value = dup.json().await.unwrap();
    assert_eq!(dup["error"]["code"], "duplicate");

    let upload = client
        .post(format!(
            "{}/collections/{}/documents?filename=handbook.docx",
            base, collection_id
        ))
        .body(minimal_docx(&["Holiday policy", "Invoice approvals go to finance"]))
        .send()
        .await
        .unwrap();
    assert_eq!(upload.status(), 202);
    let document: Value = upload.json().await.unwrap();
    let document_id = document["id"].as_str().unwrap().to_string();
    assert_eq!(document["fileType"], "docx");

    let status = wait_for_completion(&client, &base, &document_id).await;
    assert!(status["chunkCount"].as_u64().unwrap() >= 1);
    assert_eq!(status["chunkCount"], status["embeddedCount"]);

    let search: Value = client
        .post(format!("{}/search", base))
        .json(&json!({ "query": "holiday", "collectionIds": [collection_id], "limit": 3 }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(search["hits"][0]["chunk"]["documentId"], document_id.as_str());
}

#[tokio::test]
async fn test_error_contract() {
    let ollama = mock_ollama().await;
    let tmp = TempDir::new().unwrap();
    let (app, provider_id) = app_with_ollama(&tmp, &ollama).await;
    let collection = app
        .pipeline
        .create_collection(docrag::ingest::NewCollection {
            name: "c".to_string(),
            embedding_provider_id: provider_id,
            embedding_model_id: EMBED_MODEL.to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    let base = serve(app).await;
    let client = reqwest::Client::new();

    let unsupported = client
        .post(format!(
            "{}/collections/{}/documents?filename=notes.txt",
            base, collection.id
        ))
        .body("plain text")
        .send()
        .await
        .unwrap();
    assert_eq!(unsupported.status(), 400);
    let body: Value = unsupported.json().await.unwrap();
    assert_eq!(body["error"]["code"], "unsupported_type");

    let zero_limit = client
        .post(format!("{}/search", base))
        .json(&json!({ "query": "x", "collectionIds": [collection.id], "limit": 0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(zero_limit.status(), 400);

    let unknown = client
        .post(format!("{}/search", base))
        .json(&json!({ "query": "x", "collectionIds": ["missing"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status(), 404);
    let body: Value = unknown.json().await.unwrap();
    assert_eq!(body["error"]["code"], "not_found");

    let missing_provider = client
        .get(format!("{}/providers/nope/models", base))
        .send()
        .await
        .unwrap();
    assert_eq!(missing_provider.status(), 404);
}
