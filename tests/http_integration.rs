//! Integration tests for the resource pipeline using wiremock
//!
//! These tests drive full commands through the reqwest transport against
//! mocked endpoints, checking the requests that reach the wire and the
//! classification of every response family.

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::{json, Value};
use wiremock::matchers::{bearer_token, body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use xbe::api::{HttpTransport, TokenResolver};
use xbe::error::{CliError, ErrorKind};
use xbe::resource::{Action, Completion, Dispatcher, Invocation, Outcome, Registry, Verb};

const JSON_API: &str = "application/vnd.api+json";

/// Matches requests that carry no Authorization header
struct NoAuthorization;

impl wiremock::Match for NoAuthorization {
    fn matches(&self, request: &Request) -> bool {
        !request.headers.contains_key("authorization")
    }
}

async fn run_with(
    server: &MockServer,
    tokens: BTreeMap<String, String>,
    action: Action,
    resource: &str,
    args: &[&str],
) -> Result<Completion, CliError> {
    let registry = Registry::builtin().expect("registry should load");
    let resolver = TokenResolver::new(None, &tokens);
    let transport = HttpTransport::new(Duration::from_secs(5)).expect("transport should build");
    let dispatcher = Dispatcher::new(&registry, &resolver, &transport, server.uri());

    let invocation = Invocation::new(Verb::for_action(action), resource, action, args.iter().copied());
    dispatcher.execute(&invocation).await
}

async fn run(
    server: &MockServer,
    action: Action,
    resource: &str,
    args: &[&str],
) -> Result<Completion, CliError> {
    let tokens = BTreeMap::from([(server.uri(), "test-token".to_string())]);
    run_with(server, tokens, action, resource, args).await
}

fn cost_index_doc(id: &str, name: &str) -> Value {
    json!({
        "data": {
            "type": "cost-indexes",
            "id": id,
            "attributes": {"name": name, "description": null, "expired-at": null},
            "relationships": {"broker": {"data": {"type": "brokers", "id": "5"}}}
        }
    })
}

/// Tests for successful commands
mod success_tests {
    use super::*;

    #[tokio::test]
    async fn test_create_sends_json_api_document() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/cost-indexes"))
            .and(bearer_token("test-token"))
            .and(header("content-type", JSON_API))
            .and(header("accept", JSON_API))
            .and(body_json(json!({
                "data": {
                    "type": "cost-indexes",
                    "attributes": {"name": "Fuel"},
                    "relationships": {"broker": {"data": {"type": "brokers", "id": "5"}}}
                }
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(cost_index_doc("12", "Fuel")))
            .expect(1)
            .mount(&server)
            .await;

        let completion = run(&server, Action::Create, "cost-indexes", &["--name", "Fuel", "--broker", "5"])
            .await
            .expect("create should succeed");

        let Outcome::Record(record) = completion.outcome else {
            panic!("expected a record");
        };
        assert_eq!(record["id"], "12");
        assert_eq!(record["name"], "Fuel");
        assert_eq!(record["broker_id"], "5");
        assert!(!completion.json);
    }

    #[tokio::test]
    async fn test_list_sends_filters_and_pagination() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/cost-indexes"))
            .and(query_param("filter[broker]", "5"))
            .and(query_param("filter[is-expired]", "false"))
            .and(query_param("page[limit]", "10"))
            .and(bearer_token("test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"type": "cost-indexes", "id": "1", "attributes": {"name": "Fuel"}},
                    {"type": "cost-indexes", "id": "2", "attributes": {"name": "Steel"}}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let completion = run(
            &server,
            Action::List,
            "cost-indexes",
            &["--broker", "5", "--is-expired", "false", "--limit", "10", "--json"],
        )
        .await
        .expect("list should succeed");

        assert!(completion.json);
        let Outcome::Records(records) = completion.outcome else {
            panic!("expected records");
        };
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["name"], "Steel");
    }

    #[tokio::test]
    async fn test_update_sends_patch_with_id() {
        let server = MockServer::start().await;

        Mock::given(method("PATCH"))
            .and(path("/v1/cost-indexes/12"))
            .and(body_json(json!({
                "data": {
                    "type": "cost-indexes",
                    "id": "12",
                    "attributes": {"description": "Diesel"}
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(cost_index_doc("12", "Fuel")))
            .expect(1)
            .mount(&server)
            .await;

        run(&server, Action::Update, "cost-indexes", &["12", "--description", "Diesel"])
            .await
            .expect("update should succeed");
    }

    #[tokio::test]
    async fn test_show_returns_single_record() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/cost-indexes/12"))
            .respond_with(ResponseTemplate::new(200).set_body_json(cost_index_doc("12", "Fuel")))
            .mount(&server)
            .await;

        let completion = run(&server, Action::Show, "cost-indexes", &["12"])
            .await
            .expect("show should succeed");
        assert!(matches!(completion.outcome, Outcome::Record(ref r) if r["id"] == "12"));
    }

    #[tokio::test]
    async fn test_confirmed_delete_issues_exactly_one_request() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/v1/cost-indexes/12"))
            .and(bearer_token("test-token"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let completion = run(&server, Action::Delete, "cost-indexes", &["12", "--confirm"])
            .await
            .expect("delete should succeed");

        let Outcome::Record(record) = completion.outcome else {
            panic!("expected a record");
        };
        assert_eq!(record["id"], "12");
        assert_eq!(record["deleted"], true);
    }

    #[tokio::test]
    async fn test_no_auth_omits_authorization_header() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/cost-indexes"))
            .and(NoAuthorization)
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .expect(1)
            .mount(&server)
            .await;

        let completion = run_with(&server, BTreeMap::new(), Action::List, "cost-indexes", &["--no-auth"])
            .await
            .expect("unauthenticated list should succeed");
        assert_eq!(completion.outcome, Outcome::Records(vec![]));
    }

    #[tokio::test]
    async fn test_explicit_token_overrides_store() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/cost-indexes/1"))
            .and(bearer_token("flag-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(cost_index_doc("1", "Fuel")))
            .expect(1)
            .mount(&server)
            .await;

        run(&server, Action::Show, "cost-indexes", &["1", "--token", "flag-token"])
            .await
            .expect("show should succeed");
    }
}

/// Tests for error classification
mod error_tests {
    use super::*;

    async fn failing_show(status: u16, body: Value) -> CliError {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/cost-indexes/1"))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&server)
            .await;

        run(&server, Action::Show, "cost-indexes", &["1"])
            .await
            .expect_err("request should fail")
    }

    #[tokio::test]
    async fn test_401_is_auth_error() {
        let err = failing_show(401, json!({"errors": [{"title": "Not Authorized"}]})).await;
        assert_eq!(err.kind(), ErrorKind::Auth);
        assert_eq!(err.exit_code(), 3);
    }

    #[tokio::test]
    async fn test_403_is_auth_error() {
        let err = failing_show(403, json!({"errors": [{"title": "Forbidden"}]})).await;
        assert_eq!(err.kind(), ErrorKind::Auth);
    }

    #[tokio::test]
    async fn test_404_is_not_found() {
        let err = failing_show(404, json!({"errors": [{"title": "Record not found"}]})).await;
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.exit_code(), 5);
    }

    #[tokio::test]
    async fn test_409_is_conflict() {
        let err = failing_show(409, json!({"errors": [{"detail": "stale object"}]})).await;
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(err.to_string().contains("stale object"));
    }

    #[tokio::test]
    async fn test_500_is_transport() {
        let err = failing_show(500, json!({"error": "boom"})).await;
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(err.exit_code(), 7);
    }

    #[tokio::test]
    async fn test_422_surfaces_server_messages() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/cost-indexes"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({
                "errors": [
                    {"title": "Invalid", "detail": "name has already been taken", "source": {"pointer": "/data/attributes/name"}},
                    {"title": "broker must exist"}
                ]
            })))
            .mount(&server)
            .await;

        let err = run(&server, Action::Create, "cost-indexes", &["--name", "Fuel"])
            .await
            .expect_err("server should reject");

        assert_eq!(err.kind(), ErrorKind::RemoteValidation);
        assert_eq!(err.exit_code(), 4);
        let message = err.to_string();
        assert!(message.contains("422"));
        assert!(message.contains("name has already been taken"));
        assert!(message.contains("broker must exist"));
    }

    #[tokio::test]
    async fn test_invalid_json_body_is_transport_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/cost-indexes/1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&server)
            .await;

        let err = run(&server, Action::Show, "cost-indexes", &["1"])
            .await
            .expect_err("body should not parse");
        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    #[tokio::test]
    async fn test_connection_failure_is_transport_error() {
        let server = MockServer::start().await;
        let err = run(
            &server,
            Action::Show,
            "cost-indexes",
            &["1", "--base-url", "http://127.0.0.1:1", "--token", "t"],
        )
        .await
        .expect_err("nothing listens on port 1");
        assert_eq!(err.kind(), ErrorKind::Transport);
    }
}

/// Tests for commands that must never reach the server
mod no_request_tests {
    use super::*;

    async fn server_expecting_nothing() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(wiremock::matchers::any())
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .expect(0)
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_unconfirmed_delete_sends_nothing() {
        let server = server_expecting_nothing().await;
        let err = run(&server, Action::Delete, "cost-indexes", &["12"])
            .await
            .expect_err("delete needs --confirm");
        assert_eq!(err.kind(), ErrorKind::LocalValidation);
        assert!(err.to_string().contains("--confirm"));
    }

    #[tokio::test]
    async fn test_missing_required_sends_nothing() {
        let server = server_expecting_nothing().await;
        let err = run(&server, Action::Create, "cost-indexes", &["--description", "d"])
            .await
            .expect_err("name is required");
        assert_eq!(err.kind(), ErrorKind::LocalValidation);
        assert_eq!(err.to_string(), r#"required flag(s) "name" not set"#);
    }

    #[tokio::test]
    async fn test_missing_token_sends_nothing() {
        let server = server_expecting_nothing().await;
        let err = run_with(&server, BTreeMap::new(), Action::List, "cost-indexes", &[])
            .await
            .expect_err("no token available");
        assert_eq!(err.kind(), ErrorKind::Auth);
        assert!(err.to_string().starts_with("Not Authorized"));
    }

    #[tokio::test]
    async fn test_help_sends_nothing() {
        let server = server_expecting_nothing().await;
        let completion = run(&server, Action::Create, "cost-indexes", &["--help"])
            .await
            .expect("help should render");
        assert!(matches!(completion.outcome, Outcome::Help(ref text) if text.contains("--expired-at")));
    }
}
