use logship::config::types::Config;
use logship::config::CredentialsConfig;
use logship::delivery::{DeliveryManager, StreamIdentity};
use logship::sink::{
    CloudWatchClient, CloudWatchConnector, Credentials, InputLogEvent, PutLogEventsRequest,
    RemoteSink, SinkConnector, SinkError,
};
use mockito::{Matcher, Server};
use std::sync::Arc;
use std::time::Duration;

fn credentials() -> Credentials {
    Credentials {
        access_key_id: "AKIDEXAMPLE".to_string(),
        secret_access_key: "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".to_string(),
        session_token: None,
    }
}

fn client(url: &str) -> CloudWatchClient {
    CloudWatchClient::new(
        url,
        "us-east-1".to_string(),
        credentials(),
        Duration::from_secs(5),
        Duration::from_secs(5),
    )
    .expect("failed to build client")
}

#[tokio::test]
async fn test_put_log_events_is_signed_and_returns_token() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/")
        .match_header("x-amz-target", "Logs_20140328.PutLogEvents")
        .match_header("content-type", "application/x-amz-json-1.1")
        .match_header(
            "authorization",
            Matcher::Regex(
                r"^AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/\d{8}/us-east-1/logs/aws4_request, SignedHeaders=[a-z0-9;-]+, Signature=[0-9a-f]{64}$"
                    .to_string(),
            ),
        )
        .match_header("x-amz-date", Matcher::Regex(r"^\d{8}T\d{6}Z$".to_string()))
        .match_body(Matcher::PartialJsonString(
            r#"{"logGroupName":"app","logStreamName":"web/2026-10-18","sequenceToken":"41","logEvents":[{"timestamp":1000,"message":"hello"}]}"#
                .to_string(),
        ))
        .with_status(200)
        .with_body(r#"{"nextSequenceToken":"42"}"#)
        .create_async()
        .await;

    let events = vec![InputLogEvent {
        timestamp: 1000,
        message: "hello".to_string(),
    }];
    let response = client(&server.url())
        .put_log_events(PutLogEventsRequest {
            log_group_name: "app",
            log_stream_name: "web/2026-10-18",
            log_events: &events,
            sequence_token: Some("41"),
        })
        .await
        .expect("put should succeed");

    assert_eq!(response.next_sequence_token.as_deref(), Some("42"));
    assert!(response.rejected_log_events_info.is_none());
    mock.assert_async().await;
}

#[tokio::test]
async fn test_first_append_omits_sequence_token() {
    let mut server = Server::new_async().await;
    let with_token = server
        .mock("POST", "/")
        .match_body(Matcher::Regex("sequenceToken".to_string()))
        .with_status(500)
        .expect(0)
        .create_async()
        .await;
    let without_token = server
        .mock("POST", "/")
        .match_header("x-amz-target", "Logs_20140328.PutLogEvents")
        .with_status(200)
        .with_body(r#"{"nextSequenceToken":"1"}"#)
        .expect(1)
        .create_async()
        .await;

    let events = vec![InputLogEvent {
        timestamp: 1,
        message: "x".to_string(),
    }];
    client(&server.url())
        .put_log_events(PutLogEventsRequest {
            log_group_name: "app",
            log_stream_name: "s",
            log_events: &events,
            sequence_token: None,
        })
        .await
        .expect("put should succeed");

    with_token.assert_async().await;
    without_token.assert_async().await;
}

#[tokio::test]
async fn test_stale_token_error_carries_expected_token() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/")
        .match_header("x-amz-target", "Logs_20140328.PutLogEvents")
        .with_status(400)
        .with_body(
            r#"{"__type":"InvalidSequenceTokenException","message":"The given sequenceToken is invalid. The next expected sequenceToken is: 4960","expectedSequenceToken":"4960"}"#,
        )
        .create_async()
        .await;

    let err = client(&server.url())
        .put_log_events(PutLogEventsRequest {
            log_group_name: "app",
            log_stream_name: "s",
            log_events: &[],
            sequence_token: Some("1"),
        })
        .await
        .unwrap_err();

    match err {
        SinkError::InvalidSequenceToken { expected } => {
            assert_eq!(expected.as_deref(), Some("4960"))
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_create_calls_map_resource_errors() {
    let mut server = Server::new_async().await;
    let _group = server
        .mock("POST", "/")
        .match_header("x-amz-target", "Logs_20140328.CreateLogGroup")
        .with_status(400)
        .with_body(r#"{"__type":"ResourceAlreadyExistsException","message":"The specified log group already exists"}"#)
        .create_async()
        .await;
    let _stream = server
        .mock("POST", "/")
        .match_header("x-amz-target", "Logs_20140328.CreateLogStream")
        .with_status(400)
        .with_body(r#"{"__type":"ResourceNotFoundException","message":"The specified log group does not exist."}"#)
        .create_async()
        .await;

    let client = client(&server.url());
    assert!(matches!(
        client.create_log_group("app").await,
        Err(SinkError::AlreadyExists(_))
    ));
    assert!(matches!(
        client.create_log_stream("missing", "s").await,
        Err(SinkError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_server_errors_are_transient() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/")
        .with_status(503)
        .with_body("Service Unavailable")
        .create_async()
        .await;

    let err = client(&server.url())
        .create_log_group("app")
        .await
        .unwrap_err();
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_connector_without_region_cannot_connect() {
    let mut config = Config::new("app");
    config.endpoint = Some("http://127.0.0.1:9".to_string());
    config.region = Some(String::new());
    config.credentials = Some(CredentialsConfig {
        access_key_id: "AKIDEXAMPLE".to_string(),
        secret_access_key: "secret".to_string(),
        session_token: None,
    });

    // An empty configured region falls through to the environment.
    let connector = CloudWatchConnector::from_config(&config);
    if std::env::var("AWS_REGION").is_err() && std::env::var("AWS_DEFAULT_REGION").is_err() {
        assert!(matches!(connector.connect(), Err(SinkError::MissingRegion)));
    }
}

#[tokio::test]
async fn test_manager_delivers_through_http_sink() {
    let mut server = Server::new_async().await;
    let create = server
        .mock("POST", "/")
        .match_header("x-amz-target", "Logs_20140328.CreateLogStream")
        .match_body(Matcher::Regex(
            r#""logStreamName":"web/\d{4}-\d{2}-\d{2}""#.to_string(),
        ))
        .with_status(200)
        .with_body("")
        .expect(1)
        .create_async()
        .await;
    let put = server
        .mock("POST", "/")
        .match_header("x-amz-target", "Logs_20140328.PutLogEvents")
        .match_body(Matcher::Regex(r#""message":"one".*"message":"two""#.to_string()))
        .with_status(200)
        .with_body(r#"{"nextSequenceToken":"7"}"#)
        .expect(1)
        .create_async()
        .await;

    let mut config = Config::new("app");
    config.log_stream = Some("web".to_string());
    config.region = Some("us-east-1".to_string());
    config.endpoint = Some(server.url());
    config.credentials = Some(CredentialsConfig {
        access_key_id: "AKIDEXAMPLE".to_string(),
        secret_access_key: "secret".to_string(),
        session_token: None,
    });

    let identity = StreamIdentity::new("app", Some("web".to_string())).unwrap();
    let manager = DeliveryManager::new(
        identity,
        Arc::new(CloudWatchConnector::from_config(&config)),
        config.delivery.clone(),
    )
    .unwrap();

    manager.deliver("one");
    manager.deliver("two");
    let stats = manager.shutdown().await;

    assert_eq!(stats.events_accepted, 2);
    assert_eq!(stats.events_appended, 2);
    assert_eq!(stats.batches_appended, 1);
    create.assert_async().await;
    put.assert_async().await;
}
