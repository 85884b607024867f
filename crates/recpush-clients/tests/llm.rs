//! Integration tests for `LlmClient` using wiremock HTTP mocks.

use recpush_clients::{ClientError, LlmClient, RetryPolicy};
use recpush_core::LlmConfig;
use recpush_pipeline::{ProfileInference, SourceData};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_client(base_url: &str, max_token_length: usize) -> LlmClient {
    let config = LlmConfig {
        base_url: base_url.to_owned(),
        api_key: Some("llm-key".to_owned()),
        model: "test-model".to_owned(),
        max_token_length,
        max_concurrency: 2,
        timeout_secs: 5,
    };
    LlmClient::from_config(&config, RetryPolicy::none())
        .expect("client construction should not fail")
        .expect("api key is configured")
}

fn completion(content: &serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "id": "cmpl-1",
        "object": "chat.completion",
        "choices": [
            {
                "index": 0,
                "message": {"role": "assistant", "content": content.to_string()},
                "finish_reason": "stop"
            }
        ]
    })
}

fn source(posts: &[&str]) -> SourceData {
    SourceData {
        cid: "u1".to_owned(),
        community_posts: posts.iter().map(|p| (*p).to_owned()).collect(),
        group_messages: Vec::new(),
        active_groups: Vec::new(),
    }
}

#[tokio::test]
async fn single_segment_profile_is_returned() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer llm-key"))
        .and(body_string_contains("test-model"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(&serde_json::json!({
            "interests": ["defi"],
            "weighted_keywords": [{"keyword": "defi", "weight": 0.9}],
            "activity_level": "medium",
            "user_type": "investor"
        }))))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server.uri(), 8000);
    let attrs = client
        .infer_profile(&source(&["defi yield farming"]))
        .await
        .expect("inference should succeed");

    assert_eq!(attrs.interests, vec!["defi"]);
    assert_eq!(attrs.user_type, "investor");
    assert_eq!(attrs.weighted_keywords[0].keyword, "defi");
}

#[tokio::test]
async fn single_segment_keywords_are_normalized() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(&serde_json::json!({
            "interests": ["nft", "defi"],
            "weighted_keywords": [
                {"keyword": "nft", "weight": 0.2},
                {"keyword": "defi", "weight": 0.3},
                {"keyword": "defi", "weight": 1.4}
            ]
        }))))
        .mount(&server)
        .await;

    let client = test_client(&server.uri(), 8000);
    let attrs = client
        .infer_profile(&source(&["defi and nft"]))
        .await
        .expect("inference should succeed");

    let keywords: Vec<(&str, f64)> = attrs
        .weighted_keywords
        .iter()
        .map(|wk| (wk.keyword.as_str(), wk.weight))
        .collect();
    assert_eq!(keywords, vec![("defi", 1.0), ("nft", 0.2)]);
}

#[tokio::test]
async fn segments_are_folded_into_one_profile() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(body_string_contains("defi yield"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(&serde_json::json!({
            "interests": ["defi"],
            "weighted_keywords": [{"keyword": "defi", "weight": 0.9}]
        }))))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("nft mint"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(&serde_json::json!({
            "interests": ["nft"],
            "weighted_keywords": [{"keyword": "nft", "weight": 0.8}],
            "user_type": "collector"
        }))))
        .mount(&server)
        .await;

    // Two tokens per segment puts every rendered line in its own request;
    // the header line matches no mock and fails without sinking the rest.
    let client = test_client(&server.uri(), 4);
    let attrs = client
        .infer(&source(&["defi yield", "nft mint"]))
        .await
        .expect("partial failure still yields a profile");

    let keywords: Vec<&str> = attrs
        .weighted_keywords
        .iter()
        .map(|wk| wk.keyword.as_str())
        .collect();
    assert_eq!(keywords, vec!["defi", "nft"]);
    assert!(attrs.interests.contains(&"defi".to_owned()));
    assert!(attrs.interests.contains(&"nft".to_owned()));
    assert_eq!(attrs.user_type, "collector");
}

#[tokio::test]
async fn all_segments_failing_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;

    let client = test_client(&server.uri(), 8000);
    let err = client.infer(&source(&["anything"])).await.unwrap_err();

    assert!(
        matches!(err, ClientError::AllSegmentsFailed { segments: 1 }),
        "unexpected error: {err:?}"
    );
}
