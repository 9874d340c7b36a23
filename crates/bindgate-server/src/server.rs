//! Gate server implementation

use axum::{middleware, routing::get, Router};
use bindgate_auth::{Directory, LdapDirectory, SearchAndBindAuthenticator};
use bindgate_core::{config::GateConfig, Result};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};
use tracing::{info, warn};

use crate::metrics::{metrics_handler, metrics_middleware, MetricsRecorder};
use crate::middleware::auth::require_ldap_auth;
use crate::routes;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GateConfig>,
    pub authenticator: Arc<SearchAndBindAuthenticator>,
    pub metrics: Arc<MetricsRecorder>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: GateConfig, directory: Arc<dyn Directory>) -> Result<Self> {
        let metrics = Arc::new(MetricsRecorder::new()?);
        let authenticator = Arc::new(SearchAndBindAuthenticator::new(
            Arc::new(config.ldap.clone()),
            directory,
        ));

        Ok(Self {
            config: Arc::new(config),
            authenticator,
            metrics,
            start_time: Instant::now(),
        })
    }
}

/// Gate server
pub struct GateServer {
    config: GateConfig,
    directory: Option<Arc<dyn Directory>>,
}

impl GateServer {
    pub fn new(config: GateConfig) -> Self {
        Self {
            config,
            directory: None,
        }
    }

    /// Authenticate against the given directory instead of `ldap.url`
    pub fn with_directory(config: GateConfig, directory: Arc<dyn Directory>) -> Self {
        Self {
            config,
            directory: Some(directory),
        }
    }

    pub async fn run(self) -> Result<()> {
        self.config.validate()?;

        let directory = match self.directory {
            Some(directory) => {
                warn!("Using in-process directory, ldap.url is ignored");
                directory
            }
            None => Arc::new(LdapDirectory::new(Arc::new(self.config.ldap.clone()))),
        };

        let addr = self.config.server.addr();
        let ldap_url = self.config.ldap.url.clone();
        let state = AppState::new(self.config, directory)?;
        info!("Prometheus metrics initialized");

        let app = create_router(state);
        let listener = TcpListener::bind(&addr).await?;

        info!("Bindgate listening on http://{}", addr);
        info!("Authenticating against {}", ldap_url);
        info!("Prometheus metrics at http://{}/management/metrics", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Bindgate stopped");
        Ok(())
    }
}

/// Build the gate router
///
/// `/apps` and `/management/metrics` sit behind the LDAP gate; health stays open.
pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/apps", get(routes::list_apps))
        .route("/management/metrics", get(metrics_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_ldap_auth,
        ));

    Router::new()
        .route("/management/health", get(routes::health_check))
        .merge(protected)
        .layer(middleware::from_fn_with_state(
            state.metrics.clone(),
            metrics_middleware,
        ))
        // Headers stay out of spans: they carry credentials
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default()))
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
        response::Response,
    };
    use bindgate_auth::{basic_authorization_header, MemoryDirectory};
    use bindgate_core::SearchConfig;
    use tower::ServiceExt;

    const PEOPLE: &str = "ou=people,dc=example,dc=org";

    /// A gate in front of a seeded in-memory directory
    ///
    /// Fields drop in declaration order, so the app goes before the directory.
    pub(crate) struct GateFixture {
        pub app: Router,
        pub state: AppState,
        pub directory: MemoryDirectory,
    }

    impl GateFixture {
        /// Same configuration, but the directory cannot be reached
        pub fn unreachable_state(&self) -> AppState {
            let mut config = (*self.state.config).clone();
            config.ldap.url = "ldap://127.0.0.1:1".to_string();
            config.ldap.use_tls = false;
            let directory = Arc::new(LdapDirectory::new(Arc::new(config.ldap.clone())));
            AppState::new(config, directory).unwrap()
        }
    }

    pub(crate) fn config() -> GateConfig {
        let mut config = GateConfig::default();
        config.gate.apps = vec!["time-source".to_string(), "log-sink".to_string()];
        config.ldap = SearchConfig {
            url: "ldaps://localhost:40636".to_string(),
            base_dn: PEOPLE.to_string(),
            search_filter: "(uid={0})".to_string(),
            use_tls: true,
            timeout_seconds: 2,
            ..Default::default()
        };
        config
    }

    pub(crate) fn fixture() -> GateFixture {
        let directory = MemoryDirectory::new();
        directory.add_user(PEOPLE, "joe", "joespassword");
        directory.add_user("ou=otherpeople,dc=example,dc=org", "bob", "bobspassword");

        let state = AppState::new(config(), Arc::new(directory.clone())).unwrap();
        let app = create_router(state.clone());

        GateFixture {
            app,
            state,
            directory,
        }
    }

    async fn get(app: &Router, uri: &str, credentials: Option<(&str, &str)>) -> Response {
        let mut builder = Request::builder().uri(uri);
        if let Some((username, password)) = credentials {
            builder = builder.header(
                header::AUTHORIZATION,
                basic_authorization_header(username, password),
            );
        }
        app.clone()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_protected_routes_challenge_anonymous_requests() {
        let fixture = fixture();

        for uri in ["/apps", "/management/metrics"] {
            let response = get(&fixture.app, uri, None).await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
            assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
        }
    }

    #[tokio::test]
    async fn test_joe_can_list_apps() {
        let fixture = fixture();

        let response = get(&fixture.app, "/apps", Some(("joe", "joespassword"))).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["apps"], serde_json::json!(["time-source", "log-sink"]));
        assert_eq!(body["user"]["dn"], "uid=joe,ou=people,dc=example,dc=org");
    }

    #[tokio::test]
    async fn test_joe_can_read_metrics() {
        let fixture = fixture();

        let response = get(
            &fixture.app,
            "/management/metrics",
            Some(("joe", "joespassword")),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_string(response)
            .await
            .contains(crate::metrics::names::AUTH_ATTEMPTS_TOTAL));
    }

    #[tokio::test]
    async fn test_user_outside_search_base_is_rejected() {
        let fixture = fixture();

        let response = get(&fixture.app, "/apps", Some(("bob", "bobspassword"))).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_wrong_password_is_rejected() {
        let fixture = fixture();

        let response = get(&fixture.app, "/apps", Some(("joe", "wrongpassword"))).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_health_is_open() {
        let fixture = fixture();

        let response = get(&fixture.app, "/management/health", None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["status"], "UP");
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let fixture = fixture();

        let response = get(&fixture.app, "/nope", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_every_request_releases_its_connection() {
        let fixture = fixture();

        get(&fixture.app, "/apps", Some(("joe", "joespassword"))).await;
        get(&fixture.app, "/apps", Some(("joe", "wrongpassword"))).await;
        get(&fixture.app, "/apps", Some(("bob", "bobspassword"))).await;

        assert_eq!(fixture.directory.opened_sessions(), 3);
        assert_eq!(fixture.directory.active_sessions(), 0);
    }

    #[tokio::test]
    async fn test_invalid_config_is_refused_before_binding() {
        let mut config = config();
        config.ldap.url = String::new();

        let server = GateServer::with_directory(config, Arc::new(MemoryDirectory::new()));
        assert!(server.run().await.is_err());
    }
}
