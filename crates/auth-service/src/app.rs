//! Router and shared application state

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use oauth_core::AuthorizationServer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::{oauth, validation};

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub server: AuthorizationServer,
    pub public_url: String,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // OAuth metadata (RFC 8414)
        .route(
            "/.well-known/oauth-authorization-server",
            get(oauth::metadata::handler),
        )
        // Dynamic Client Registration (RFC 7591)
        .route("/register", post(oauth::registration::handler))
        // Authorization endpoint
        .route(
            "/authorize",
            get(oauth::authorize::get_handler).post(oauth::authorize::post_handler),
        )
        // Token endpoint
        .route("/token", post(oauth::token::handler))
        .route("/userinfo", get(oauth::userinfo::handler))
        // Validation endpoint for Caddy forward_auth
        .route("/validate", get(validation::handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::{Body, to_bytes};
    use axum::http::{HeaderMap, Request, StatusCode, header};
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use oauth_core::SigningKey;
    use oauth_core::crypto::pkce_challenge;
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use url::Url;

    const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
    const ISSUER: &str = "https://auth.example";

    fn app() -> Router {
        let config = Config::default();
        let server = AuthorizationServer::new(
            config.oauth_settings(ISSUER),
            &SigningKey::generate(),
        );
        router(Arc::new(AppState {
            config,
            server,
            public_url: ISSUER.to_string(),
        }))
    }

    struct TestResponse {
        status: StatusCode,
        headers: HeaderMap,
        body: Vec<u8>,
    }

    impl TestResponse {
        fn json(&self) -> Value {
            serde_json::from_slice(&self.body).expect("JSON body")
        }

        fn location(&self) -> Url {
            let location = self
                .headers
                .get(header::LOCATION)
                .expect("Location header")
                .to_str()
                .unwrap();
            Url::parse(location).unwrap()
        }
    }

    async fn send(app: &Router, request: Request<Body>) -> TestResponse {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec();
        TestResponse {
            status,
            headers,
            body,
        }
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn form(uri: &str, pairs: &[(&str, &str)]) -> Request<Body> {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish();
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap()
    }

    fn bearer(uri: &str, token: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap()
    }

    async fn register(app: &Router, body: Value) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri("/register")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        send(app, request).await
    }

    fn query_param(url: &Url, name: &str) -> Option<String> {
        url.query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    fn authorize_uri(client_id: &str, redirect_uri: &str) -> String {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("response_type", "code")
            .append_pair("client_id", client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", "read")
            .append_pair("state", "S1")
            .append_pair("code_challenge", &pkce_challenge(VERIFIER))
            .append_pair("code_challenge_method", "S256")
            .finish();
        format!("/authorize?{}", query)
    }

    #[tokio::test]
    async fn test_discovery_document() {
        let app = app();
        let response = send(&app, get_request("/.well-known/oauth-authorization-server")).await;
        assert_eq!(response.status, StatusCode::OK);

        let doc = response.json();
        assert_eq!(doc["issuer"], ISSUER);
        assert_eq!(doc["token_endpoint"], "https://auth.example/token");
        assert_eq!(doc["registration_endpoint"], "https://auth.example/register");
        assert_eq!(doc["response_types_supported"], json!(["code"]));
        assert_eq!(
            doc["grant_types_supported"],
            json!(["authorization_code", "refresh_token"])
        );
        assert_eq!(doc["code_challenge_methods_supported"], json!(["S256", "plain"]));
        assert_eq!(
            doc["token_endpoint_auth_methods_supported"],
            json!(["none", "client_secret_basic", "client_secret_post"])
        );
    }

    #[tokio::test]
    async fn test_registration() {
        let app = app();
        let response = register(
            &app,
            json!({"client_name": "demo", "redirect_uris": ["https://x/cb"]}),
        )
        .await;
        assert_eq!(response.status, StatusCode::CREATED);

        let info = response.json();
        assert!(info["client_id"].as_str().unwrap().starts_with("client_"));
        assert!(info.get("client_secret").is_none());
        assert_eq!(info["client_secret_expires_at"], 0);
        assert!(info["client_id_issued_at"].is_i64());
    }

    #[tokio::test]
    async fn test_registration_errors() {
        let app = app();

        let response = register(&app, json!({"redirect_uris": ["https://x/cb"]})).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.json()["error"], "invalid_client_metadata");

        let response = register(&app, json!({"client_name": "demo", "redirect_uris": []})).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.json()["error"], "invalid_redirect_uri");

        let response = register(&app, json!({"client_name": 5})).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.json()["error"], "invalid_client_metadata");
    }

    #[tokio::test]
    async fn test_full_flow() {
        let app = app();
        let client_id = register(
            &app,
            json!({"client_name": "demo", "redirect_uris": ["https://x/cb"]}),
        )
        .await
        .json()["client_id"]
            .as_str()
            .unwrap()
            .to_string();

        // Authorize: auto-approved, redirected back with code and state
        let response = send(&app, get_request(&authorize_uri(&client_id, "https://x/cb"))).await;
        assert!(response.status.is_redirection());
        let location = response.location();
        assert_eq!(location.host_str(), Some("x"));
        assert_eq!(location.path(), "/cb");
        assert_eq!(query_param(&location, "state").as_deref(), Some("S1"));
        let code = query_param(&location, "code").unwrap();

        // Exchange
        let response = send(
            &app,
            form(
                "/token",
                &[
                    ("grant_type", "authorization_code"),
                    ("code", &code),
                    ("redirect_uri", "https://x/cb"),
                    ("client_id", &client_id),
                    ("code_verifier", VERIFIER),
                ],
            ),
        )
        .await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(
            response.headers.get(header::CACHE_CONTROL).unwrap(),
            "no-store"
        );
        let tokens = response.json();
        assert_eq!(tokens["token_type"], "Bearer");
        assert_eq!(tokens["expires_in"], 3600);
        assert_eq!(tokens["scope"], "read");
        let access_token = tokens["access_token"].as_str().unwrap().to_string();
        let refresh_token = tokens["refresh_token"].as_str().unwrap().to_string();

        // Replay fails
        let response = send(
            &app,
            form(
                "/token",
                &[
                    ("grant_type", "authorization_code"),
                    ("code", &code),
                    ("redirect_uri", "https://x/cb"),
                    ("client_id", &client_id),
                    ("code_verifier", VERIFIER),
                ],
            ),
        )
        .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.json()["error"], "invalid_grant");

        // Userinfo
        let response = send(&app, bearer("/userinfo", &access_token)).await;
        assert_eq!(response.status, StatusCode::OK);
        let info = response.json();
        assert_eq!(info["sub"], "owner");
        assert_eq!(info["scope"], "read");
        assert_eq!(info["client_id"], client_id.as_str());

        // Refresh
        let response = send(
            &app,
            form(
                "/token",
                &[
                    ("grant_type", "refresh_token"),
                    ("refresh_token", &refresh_token),
                    ("client_id", &client_id),
                ],
            ),
        )
        .await;
        assert_eq!(response.status, StatusCode::OK);
        let refreshed = response.json();
        let new_access = refreshed["access_token"].as_str().unwrap().to_string();
        assert_ne!(refreshed["refresh_token"].as_str().unwrap(), refresh_token);

        // Old access token is retired, new one passes forward_auth
        let response = send(&app, bearer("/validate", &access_token)).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers.get(header::WWW_AUTHENTICATE).unwrap(),
            "Bearer error=\"invalid_token\""
        );

        let response = send(&app, bearer("/validate", &new_access)).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.headers.get("X-Auth-User").unwrap(), "owner");
        assert_eq!(response.headers.get("X-Auth-Scope").unwrap(), "read");
    }

    #[tokio::test]
    async fn test_authorize_direct_errors() {
        let app = app();
        let client_id = register(
            &app,
            json!({"client_name": "demo", "redirect_uris": ["https://x/cb"]}),
        )
        .await
        .json()["client_id"]
            .as_str()
            .unwrap()
            .to_string();

        let response = send(&app, get_request(&authorize_uri(&client_id, "https://evil/cb"))).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert!(response.headers.get(header::LOCATION).is_none());

        let response = send(&app, get_request(&authorize_uri("client_nope", "https://x/cb"))).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert!(response.headers.get(header::LOCATION).is_none());

        let response = send(&app, get_request("/authorize?client_id=x")).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_authorize_error_redirect() {
        let app = app();
        let client_id = register(
            &app,
            json!({"client_name": "demo", "redirect_uris": ["https://x/cb"]}),
        )
        .await
        .json()["client_id"]
            .as_str()
            .unwrap()
            .to_string();

        let uri = authorize_uri(&client_id, "https://x/cb")
            .replace("response_type=code", "response_type=token");
        let response = send(&app, get_request(&uri)).await;
        assert!(response.status.is_redirection());
        let location = response.location();
        assert_eq!(
            query_param(&location, "error").as_deref(),
            Some("unsupported_response_type")
        );
        assert_eq!(query_param(&location, "state").as_deref(), Some("S1"));
        assert!(query_param(&location, "code").is_none());
    }

    #[tokio::test]
    async fn test_authorize_missing_response_type_redirects() {
        let app = app();
        let client_id = register(
            &app,
            json!({"client_name": "demo", "redirect_uris": ["https://x/cb"]}),
        )
        .await
        .json()["client_id"]
            .as_str()
            .unwrap()
            .to_string();

        let uri = authorize_uri(&client_id, "https://x/cb").replace("response_type=code&", "");
        assert!(!uri.contains("response_type"));
        let response = send(&app, get_request(&uri)).await;
        assert!(response.status.is_redirection());
        let location = response.location();
        assert_eq!(location.host_str(), Some("x"));
        assert_eq!(location.path(), "/cb");
        assert_eq!(query_param(&location, "error").as_deref(), Some("invalid_request"));
        assert_eq!(query_param(&location, "state").as_deref(), Some("S1"));
        assert!(query_param(&location, "code").is_none());
    }

    #[tokio::test]
    async fn test_confidential_client_basic_auth() {
        let app = app();
        let info = register(
            &app,
            json!({
                "client_name": "backend",
                "redirect_uris": ["https://x/cb"],
                "token_endpoint_auth_method": "client_secret_basic"
            }),
        )
        .await
        .json();
        let client_id = info["client_id"].as_str().unwrap().to_string();
        let secret = info["client_secret"].as_str().unwrap().to_string();

        let response = send(&app, get_request(&authorize_uri(&client_id, "https://x/cb"))).await;
        let code = query_param(&response.location(), "code").unwrap();

        let token_request = |credentials: String| {
            let body = url::form_urlencoded::Serializer::new(String::new())
                .append_pair("grant_type", "authorization_code")
                .append_pair("code", &code)
                .append_pair("redirect_uri", "https://x/cb")
                .append_pair("code_verifier", VERIFIER)
                .finish();
            Request::builder()
                .method("POST")
                .uri("/token")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .header(
                    header::AUTHORIZATION,
                    format!("Basic {}", STANDARD.encode(credentials)),
                )
                .body(Body::from(body))
                .unwrap()
        };

        let response = send(&app, token_request(format!("{}:wrong", client_id))).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(response.json()["error"], "invalid_client");
        assert!(response.headers.get(header::WWW_AUTHENTICATE).is_some());

        let response = send(&app, token_request(format!("{}:{}", client_id, secret))).await;
        assert_eq!(response.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_token_errors() {
        let app = app();

        let response = send(
            &app,
            form("/token", &[("grant_type", "password"), ("client_id", "c")]),
        )
        .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.json()["error"], "unsupported_grant_type");

        let response = send(
            &app,
            form(
                "/token",
                &[("grant_type", "refresh_token"), ("refresh_token", "x")],
            ),
        )
        .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.json()["error"], "invalid_request");

        let response = send(&app, form("/token", &[("code", "x")])).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.json()["error"], "invalid_request");
    }

    #[tokio::test]
    async fn test_userinfo_requires_bearer() {
        let app = app();

        let response = send(&app, get_request("/userinfo")).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);

        let response = send(&app, bearer("/userinfo", "garbage")).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    }
}
