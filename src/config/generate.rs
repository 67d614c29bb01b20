pub fn generate_starter_config() -> String {
    r#"# =============================================================================
# LOGSHIP CONFIGURATION
# =============================================================================
# Ships log lines to a CloudWatch Logs group. Each day gets its own stream,
# named "<log_stream>/<YYYY-MM-DD>".
#
# Config file locations (in order of precedence):
#   1. Path specified via --config argument
#   2. ~/.config/logship/config.yml
#   3. /etc/logship/config.yml
#
# Values may reference environment variables with $env{NAME}.

# Log group to write into (required). Created on first use if missing.
log_group: my-application

# Stream base name. Defaults to "<hostname>-<uuid>" when omitted.
# log_stream: web-1

# Region and credentials fall back to AWS_REGION / AWS_DEFAULT_REGION and
# AWS_ACCESS_KEY_ID / AWS_SECRET_ACCESS_KEY / AWS_SESSION_TOKEN.
# region: us-east-1
# credentials:
#   access_key_id: $env{AWS_ACCESS_KEY_ID}
#   secret_access_key: $env{AWS_SECRET_ACCESS_KEY}

# Override the service endpoint (e.g. localstack).
# endpoint: http://localhost:4566

delivery:
  # Events per PutLogEvents call (1-10000)
  max_batch_size: 25
  # Connection open timeout
  open_timeout: 120s
  # Request timeout
  read_timeout: 120s
  # Retries for throttling and network failures before a batch is dropped
  max_append_retries: 3
  retry_backoff: 500ms
  # How long shutdown waits for the final append
  shutdown_timeout: 30s

format:
  # text: "server=..., pid=..., severity=..., message"
  # json: structured messages rendered as JSON objects
  kind: text
  # Minimum severity shipped: debug, info, warn, error, fatal, any
  level: debug
  # progname: my-application
"#
    .to_string()
}
