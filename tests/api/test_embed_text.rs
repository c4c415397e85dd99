// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! POST /embed/text

use crate::common::{embeddings_of, json_request, FailingModel, FakeModel, TestApp, FAKE_DIM};
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use std::sync::atomic::Ordering;
use std::sync::Arc;

#[tokio::test]
async fn test_three_texts_three_vectors() {
    let app = TestApp::with_fake();
    let (status, body) = app
        .send(json_request(
            "/embed/text",
            serde_json::json!({"texts": ["a", "b", "c"]}),
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    let embeddings = embeddings_of(&body);
    assert_eq!(embeddings.len(), 3);
    assert!(embeddings.iter().all(|e| e.len() == FAKE_DIM));
}

#[tokio::test]
async fn test_order_is_preserved() {
    let app = TestApp::with_fake();
    let (_, forward) = app
        .send(json_request(
            "/embed/text",
            serde_json::json!({"texts": ["a dog", "a cat"]}),
        ))
        .await;
    let (_, reversed) = app
        .send(json_request(
            "/embed/text",
            serde_json::json!({"texts": ["a cat", "a dog"]}),
        ))
        .await;

    let forward = embeddings_of(&forward);
    let reversed = embeddings_of(&reversed);
    assert_eq!(forward[0], reversed[1]);
    assert_eq!(forward[1], reversed[0]);
    assert_ne!(forward[0], forward[1]);
}

#[tokio::test]
async fn test_same_text_same_vector() {
    let app = TestApp::with_fake();
    let (status, body) = app
        .send(json_request(
            "/embed/text",
            serde_json::json!({"texts": ["hello", "hello"]}),
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    let embeddings = embeddings_of(&body);
    assert_eq!(embeddings[0], embeddings[1]);
}

#[tokio::test]
async fn test_empty_texts_skip_model() {
    let model = Arc::new(FakeModel::new());
    let app = TestApp::new(model.clone());
    let (status, body) = app
        .send(json_request("/embed/text", serde_json::json!({"texts": []})))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({"embeddings": []}));
    assert_eq!(model.text_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_batch_is_one_model_call() {
    let model = Arc::new(FakeModel::new());
    let app = TestApp::new(model.clone());
    app.send(json_request(
        "/embed/text",
        serde_json::json!({"texts": ["a", "b", "c", "d"]}),
    ))
    .await;

    assert_eq!(model.text_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_vectors_are_unit_length() {
    let app = TestApp::with_fake();
    let (_, body) = app
        .send(json_request(
            "/embed/text",
            serde_json::json!({"texts": ["normalize me"]}),
        ))
        .await;

    let norm: f32 = embeddings_of(&body)[0].iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() < 1e-4);
}

#[tokio::test]
async fn test_model_failure_is_500() {
    let app = TestApp::new(Arc::new(FailingModel));
    let (status, body) = app
        .send(json_request("/embed/text", serde_json::json!({"texts": ["x"]})))
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error_type"], "internal_error");
    assert_eq!(body["message"], "Error embedding text: inference exploded");
    assert!(body.get("embeddings").is_none());
}

#[tokio::test]
async fn test_malformed_json_rejected() {
    let app = TestApp::with_fake();
    let request = Request::builder()
        .method("POST")
        .uri("/embed/text")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"texts\": [1, 2"))
        .unwrap();
    let (status, _) = app.send(request).await;

    assert!(status.is_client_error());
}

#[tokio::test]
async fn test_wrong_field_rejected() {
    let app = TestApp::with_fake();
    let (status, _) = app
        .send(json_request("/embed/text", serde_json::json!({"text": "a"})))
        .await;

    assert!(status.is_client_error());
}
