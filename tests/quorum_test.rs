use rum_bbs_indexer::{
    ContentSource, MemoryStorage, QuorumClient, RetryConfig, RetryingContentSource, RumIndexer,
    RumIndexerConfigBuilder, RumIndexerError,
};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

const GROUP: &str = "3bb7a3be-d145-44af-94cf-e64b992ff8f0";

fn content_path() -> String {
    format!("/app/api/v1/group/{GROUP}/content")
}

fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_retries: 2,
        initial_backoff_ms: 1,
        max_backoff_ms: 5,
        backoff_multiplier: 2.0,
        jitter: false,
    }
}

#[tokio::test]
async fn test_list_contents_sends_cursor_and_auth() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(content_path()))
        .and(query_param("num", "20"))
        .and(query_param("reverse", "false"))
        .and(query_param("include_start_trx", "false"))
        .and(query_param("start_trx", "trx-9"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "TrxId": "trx-10",
                "GroupId": GROUP,
                "SenderPubkey": "alice",
                "Data": {"type": "post", "title": "A", "content": "b"},
                "TimeStamp": "1690000000000000001"
            },
            {
                "TrxId": "trx-11",
                "SenderPubkey": "bob",
                "Data": "{\"type\":\"like\",\"objectId\":\"trx-10\"}",
                "TimeStamp": 1690000000000000002_i64
            }
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = QuorumClient::new(mock_server.uri(), Some("secret".to_string()));
    let items = client.list_contents(GROUP, Some("trx-9"), 20).await.unwrap();

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].trx_id, "trx-10");
    assert_eq!(items[0].timestamp, 1_690_000_000_000_000_001);
    assert_eq!(items[1].group_id, GROUP);
    assert_eq!(items[1].timestamp, 1_690_000_000_000_000_002);
}

#[tokio::test]
async fn test_first_page_has_no_cursor() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(content_path()))
        .and(query_param_is_missing("start_trx"))
        .respond_with(ResponseTemplate::new(200).set_body_string("null"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = QuorumClient::new(format!("{}/", mock_server.uri()), None);
    let items = client.list_contents(GROUP, None, 200).await.unwrap();
    assert!(items.is_empty());
}

#[tokio::test]
async fn test_server_error_carries_status() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(content_path()))
        .respond_with(ResponseTemplate::new(500).set_body_string("node not ready"))
        .mount(&mock_server)
        .await;

    let client = QuorumClient::new(mock_server.uri(), None);
    let err = client.list_contents(GROUP, None, 10).await.unwrap_err();
    match err {
        RumIndexerError::NodeStatus { status, message } => {
            assert_eq!(status, 500);
            assert!(message.contains("node not ready"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_malformed_body_is_decoding_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(content_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"error": "nope"})))
        .mount(&mock_server)
        .await;

    let client = QuorumClient::new(mock_server.uri(), None);
    let err = client.list_contents(GROUP, None, 10).await.unwrap_err();
    assert!(matches!(err, RumIndexerError::DecodingError(_)));
}

#[tokio::test]
async fn test_retrying_source_recovers_from_transient_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(content_path()))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path(content_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let source = RetryingContentSource::new(QuorumClient::new(mock_server.uri(), None), fast_retry());
    let items = source.list_contents(GROUP, None, 10).await.unwrap();
    assert!(items.is_empty());
}

#[tokio::test]
async fn test_retrying_source_gives_up() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(content_path()))
        .respond_with(ResponseTemplate::new(502))
        .expect(3)
        .mount(&mock_server)
        .await;

    let source = RetryingContentSource::new(QuorumClient::new(mock_server.uri(), None), fast_retry());
    let err = source.list_contents(GROUP, None, 10).await.unwrap_err();
    assert!(matches!(err, RumIndexerError::RetryExhausted { attempts: 3, .. }));
}

#[tokio::test]
async fn test_retrying_source_does_not_retry_missing_group() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(content_path()))
        .respond_with(ResponseTemplate::new(404).set_body_string("group not found"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let source = RetryingContentSource::new(QuorumClient::new(mock_server.uri(), None), fast_retry());
    let err = source.list_contents(GROUP, None, 10).await.unwrap_err();
    assert!(matches!(err, RumIndexerError::NodeStatus { status: 404, .. }));
}

#[tokio::test]
async fn test_retrying_source_waits_out_rate_limit() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(content_path()))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(2)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path(content_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let source = RetryingContentSource::new(QuorumClient::new(mock_server.uri(), None), fast_retry());
    let items = source.list_contents(GROUP, None, 10).await.unwrap();
    assert!(items.is_empty());
}

#[tokio::test]
async fn test_indexer_over_http_source() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(content_path()))
        .and(query_param_is_missing("start_trx"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "TrxId": "p1",
                "SenderPubkey": "alice",
                "Data": {"type": "post", "title": "Hello", "content": "world"},
                "TimeStamp": "1690000000000000001"
            },
            {
                "TrxId": "c1",
                "SenderPubkey": "bob",
                "Data": {"type": "comment", "objectId": "p1", "content": "hi"},
                "TimeStamp": "1690000000000000002"
            }
        ])))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path(content_path()))
        .and(query_param("start_trx", "c1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let config = RumIndexerConfigBuilder::new()
        .with_quorum(mock_server.uri())
        .with_database("postgresql://unused/db")
        .group(GROUP)
        .build()
        .unwrap();
    let storage = MemoryStorage::new();
    let source = Arc::new(QuorumClient::new(mock_server.uri(), None));
    let indexer = RumIndexer::new_with_components(config, Arc::new(storage.clone()), source);
    let mut poller = indexer.poller();

    let first = poller.run_cycle().await;
    assert_eq!(first.applied, 2);
    let second = poller.run_cycle().await;
    assert!(second.is_idle());

    let state = storage.snapshot().await;
    assert_eq!(state.posts[&(GROUP.to_string(), "p1".to_string())].comment_count, 1);
    assert!(state.statuses[GROUP].loaded);
}
