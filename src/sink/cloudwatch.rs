use super::sigv4::{sign_post, Credentials, SigningParams};
use super::traits::{
    InputLogEvent, PutLogEventsRequest, PutLogEventsResponse, RemoteSink, Result, SinkConnector,
    SinkError,
};
use crate::config::types::Config;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const SERVICE: &str = "logs";
const TARGET_PREFIX: &str = "Logs_20140328";
const CONTENT_TYPE: &str = "application/x-amz-json-1.1";

/// Builds one [`CloudWatchClient`] per worker.
#[derive(Debug, Clone)]
pub struct CloudWatchConnector {
    region: Option<String>,
    endpoint: Option<String>,
    credentials: Option<Credentials>,
    open_timeout: Duration,
    read_timeout: Duration,
}

impl CloudWatchConnector {
    pub fn from_config(config: &Config) -> Self {
        Self {
            region: config.region.clone(),
            endpoint: config.endpoint.clone(),
            credentials: config.credentials.as_ref().map(|c| Credentials {
                access_key_id: c.access_key_id.clone(),
                secret_access_key: c.secret_access_key.clone(),
                session_token: c.session_token.clone(),
            }),
            open_timeout: config.delivery.open_timeout,
            read_timeout: config.delivery.read_timeout,
        }
    }

    fn resolve_region(&self) -> Result<String> {
        self.region
            .clone()
            .or_else(|| std::env::var("AWS_REGION").ok())
            .or_else(|| std::env::var("AWS_DEFAULT_REGION").ok())
            .filter(|r| !r.is_empty())
            .ok_or(SinkError::MissingRegion)
    }
}

impl SinkConnector for CloudWatchConnector {
    fn connect(&self) -> Result<Box<dyn RemoteSink>> {
        let region = self.resolve_region()?;
        let credentials = self
            .credentials
            .clone()
            .or_else(Credentials::from_env)
            .ok_or(SinkError::MissingCredentials)?;

        let endpoint = self
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("https://logs.{}.amazonaws.com", region));

        let client = CloudWatchClient::new(
            &endpoint,
            region,
            credentials,
            self.open_timeout,
            self.read_timeout,
        )?;
        Ok(Box::new(client))
    }
}

/// HTTP client for the CloudWatch Logs JSON API.
#[derive(Debug)]
pub struct CloudWatchClient {
    client: reqwest::Client,
    endpoint: Url,
    host: String,
    region: String,
    credentials: Credentials,
}

impl CloudWatchClient {
    pub fn new(
        endpoint: &str,
        region: String,
        credentials: Credentials,
        open_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| SinkError::Connect(format!("invalid endpoint '{}': {}", endpoint, e)))?;
        let host = match (endpoint.host_str(), endpoint.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(SinkError::Connect(format!(
                    "endpoint '{}' has no host",
                    endpoint
                )))
            }
        };

        let client = reqwest::Client::builder()
            .connect_timeout(open_timeout)
            .timeout(read_timeout)
            .build()
            .map_err(|e| SinkError::Connect(e.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            host,
            region,
            credentials,
        })
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    async fn call<B, R>(&self, operation: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let payload = serde_json::to_vec(body)?;
        let target = format!("{}.{}", TARGET_PREFIX, operation);
        let params = SigningParams {
            credentials: &self.credentials,
            region: &self.region,
            service: SERVICE,
            time: Utc::now(),
        };
        let headers = sign_post(&params, &self.host, &target, CONTENT_TYPE, &payload);

        let mut request = self.client.post(self.endpoint.clone());
        for (name, value) in headers {
            request = request.header(name, value);
        }

        debug!(operation = operation, bytes = payload.len(), "Sending request");
        let response = request.body(payload).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(parse_error(status.as_u16(), &text));
        }

        let text = if text.trim().is_empty() { "{}" } else { &text };
        Ok(serde_json::from_str(text)?)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateLogGroupBody<'a> {
    log_group_name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateLogStreamBody<'a> {
    log_group_name: &'a str,
    log_stream_name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PutLogEventsBody<'a> {
    log_group_name: &'a str,
    log_stream_name: &'a str,
    log_events: &'a [InputLogEvent],
    #[serde(skip_serializing_if = "Option::is_none")]
    sequence_token: Option<&'a str>,
}

#[derive(Deserialize)]
struct EmptyResponse {}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(rename = "__type", default)]
    error_type: Option<String>,
    #[serde(alias = "Message", default)]
    message: Option<String>,
    #[serde(rename = "expectedSequenceToken", default)]
    expected_sequence_token: Option<String>,
}

/// Map an error response onto [`SinkError`].
pub(crate) fn parse_error(status: u16, body: &str) -> SinkError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let code = parsed
        .error_type
        .as_deref()
        .map(|t| t.rsplit('#').next().unwrap_or(t).to_string())
        .unwrap_or_default();
    let message = parsed.message.clone().unwrap_or_else(|| body.to_string());

    match code.as_str() {
        "ResourceAlreadyExistsException" => SinkError::AlreadyExists(message),
        "ResourceNotFoundException" => SinkError::NotFound(message),
        "InvalidSequenceTokenException" => SinkError::InvalidSequenceToken {
            expected: expected_token(&parsed),
        },
        "DataAlreadyAcceptedException" => SinkError::DataAlreadyAccepted {
            expected: expected_token(&parsed),
        },
        "ThrottlingException" => SinkError::Throttled(message),
        _ => SinkError::Service {
            status,
            code,
            message,
        },
    }
}

/// The service reports the token it wants both as a field and as the last
/// word of the message; "null" means the stream has no token yet.
fn expected_token(body: &ErrorBody) -> Option<String> {
    let token = body.expected_sequence_token.clone().or_else(|| {
        body.message
            .as_deref()
            .and_then(|m| m.split_whitespace().last())
            .map(str::to_string)
    })?;
    if token == "null" {
        None
    } else {
        Some(token)
    }
}

#[async_trait]
impl RemoteSink for CloudWatchClient {
    async fn create_log_group(&self, log_group_name: &str) -> Result<()> {
        let _: EmptyResponse = self
            .call("CreateLogGroup", &CreateLogGroupBody { log_group_name })
            .await?;
        Ok(())
    }

    async fn create_log_stream(&self, log_group_name: &str, log_stream_name: &str) -> Result<()> {
        let _: EmptyResponse = self
            .call(
                "CreateLogStream",
                &CreateLogStreamBody {
                    log_group_name,
                    log_stream_name,
                },
            )
            .await?;
        Ok(())
    }

    async fn put_log_events(
        &self,
        request: PutLogEventsRequest<'_>,
    ) -> Result<PutLogEventsResponse> {
        self.call(
            "PutLogEvents",
            &PutLogEventsBody {
                log_group_name: request.log_group_name,
                log_stream_name: request.log_stream_name,
                log_events: request.log_events,
                sequence_token: request.sequence_token,
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stale_token_from_field() {
        let body = r#"{"__type":"InvalidSequenceTokenException","message":"The given sequenceToken is invalid. The next expected sequenceToken is: 4958","expectedSequenceToken":"4958"}"#;
        match parse_error(400, body) {
            SinkError::InvalidSequenceToken { expected } => {
                assert_eq!(expected.as_deref(), Some("4958"))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_stale_token_from_message() {
        let body = r#"{"__type":"com.amazonaws.logs#InvalidSequenceTokenException","message":"The given sequenceToken is invalid. The next expected sequenceToken is: 49590"}"#;
        match parse_error(400, body) {
            SinkError::InvalidSequenceToken { expected } => {
                assert_eq!(expected.as_deref(), Some("49590"))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_null_expected_token() {
        let body = r#"{"__type":"InvalidSequenceTokenException","message":"The next expected sequenceToken is: null"}"#;
        assert!(matches!(
            parse_error(400, body),
            SinkError::InvalidSequenceToken { expected: None }
        ));
    }

    #[test]
    fn test_parse_resource_errors() {
        let exists = r#"{"__type":"ResourceAlreadyExistsException","message":"The specified log stream already exists"}"#;
        assert!(matches!(parse_error(400, exists), SinkError::AlreadyExists(_)));

        let missing = r#"{"__type":"ResourceNotFoundException","Message":"The specified log group does not exist."}"#;
        match parse_error(400, missing) {
            SinkError::NotFound(message) => assert!(message.contains("log group")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_unknown_and_garbage() {
        let err = parse_error(503, "<html>gateway</html>");
        assert!(err.is_transient());
        match err {
            SinkError::Service { status, code, message } => {
                assert_eq!(status, 503);
                assert!(code.is_empty());
                assert!(message.contains("gateway"));
            }
            other => panic!("unexpected {:?}", other),
        }

        let throttled = r#"{"__type":"ThrottlingException","message":"Rate exceeded"}"#;
        assert!(parse_error(400, throttled).is_transient());
    }

    #[test]
    fn test_put_body_omits_missing_token() {
        let events = vec![InputLogEvent {
            timestamp: 10,
            message: "hi".to_string(),
        }];
        let body = PutLogEventsBody {
            log_group_name: "g",
            log_stream_name: "s",
            log_events: &events,
            sequence_token: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "logGroupName": "g",
                "logStreamName": "s",
                "logEvents": [{"timestamp": 10, "message": "hi"}]
            })
        );
    }

    #[test]
    fn test_client_host_includes_explicit_port() {
        let creds = Credentials {
            access_key_id: "a".into(),
            secret_access_key: "b".into(),
            session_token: None,
        };
        let client = CloudWatchClient::new(
            "http://127.0.0.1:4566",
            "us-east-1".into(),
            creds,
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(client.host, "127.0.0.1:4566");
        assert_eq!(client.region(), "us-east-1");
    }
}
