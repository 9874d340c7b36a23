//! LDAP authentication middleware
//!
//! Maps an authentication verdict to an HTTP decision. Every failure,
//! whatever its cause, produces the same 401 response so a client cannot
//! tell an unknown user from a wrong password.

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use bindgate_auth::{AuthResult, Credential};
use serde::Serialize;
use serde_json::json;
use std::time::Instant;
use tracing::debug;

use crate::server::AppState;

/// Identity attached to requests that passed the gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthenticatedUser {
    pub dn: String,
    pub username: String,
}

/// Basic authentication backed by LDAP search-and-bind
pub async fn require_ldap_auth(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let realm = &state.config.gate.realm;

    let header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let credential = match header.map(Credential::from_authorization_header) {
        Some(Ok(credential)) => credential,
        Some(Err(e)) => {
            debug!("Rejecting malformed Authorization header: {}", e);
            return unauthorized(realm);
        }
        None => return unauthorized(realm),
    };

    let start = Instant::now();
    let result = state.authenticator.authenticate(&credential).await;
    state
        .metrics
        .record_auth(&result, start.elapsed().as_secs_f64());

    match result {
        AuthResult::Authenticated(dn) => {
            request.extensions_mut().insert(AuthenticatedUser {
                dn,
                username: credential.username().to_string(),
            });
            next.run(request).await
        }
        _ => unauthorized(realm),
    }
}

/// 401 with a Basic challenge
pub fn unauthorized(realm: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, format!("Basic realm=\"{}\"", realm))],
        Json(json!({
            "error": "Unauthorized",
            "message": "Full authentication is required to access this resource",
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::tests::fixture;
    use axum::{routing::get, Extension, Router};
    use bindgate_auth::basic_authorization_header;
    use tower::ServiceExt;

    async fn whoami(Extension(user): Extension<AuthenticatedUser>) -> Json<AuthenticatedUser> {
        Json(user)
    }

    fn app(state: AppState) -> Router {
        Router::new()
            .route("/whoami", get(whoami))
            .route_layer(axum::middleware::from_fn_with_state(
                state.clone(),
                require_ldap_auth,
            ))
            .with_state(state)
    }

    async fn call(app: &Router, authorization: Option<&str>) -> Response {
        let mut builder = Request::builder().uri("/whoami");
        if let Some(value) = authorization {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        app.clone()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn test_identity_is_attached() {
        let fixture = fixture();
        let app = app(fixture.state.clone());

        let response = call(&app, Some(&basic_authorization_header("joe", "joespassword"))).await;
        assert_eq!(response.status(), StatusCode::OK);

        let user: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(user["username"], "joe");
        assert_eq!(user["dn"], "uid=joe,ou=people,dc=example,dc=org");
    }

    #[tokio::test]
    async fn test_failures_are_indistinguishable() {
        let fixture = fixture();
        let app = app(fixture.state.clone());

        let wrong_password = basic_authorization_header("joe", "wrong");
        let unknown_user = basic_authorization_header("ghost", "anything");
        let cases = [
            None,
            Some("Bearer token"),
            Some("Basic !!!"),
            Some(wrong_password.as_str()),
            Some(unknown_user.as_str()),
        ];

        let mut bodies = Vec::new();
        for authorization in cases {
            let response = call(&app, authorization).await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(
                response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
                "Basic realm=\"bindgate\""
            );
            bodies.push(body_bytes(response).await);
        }

        assert!(bodies.windows(2).all(|pair| pair[0] == pair[1]));
    }

    #[tokio::test]
    async fn test_transport_error_is_unauthorized() {
        let fixture = fixture();
        let state = fixture.unreachable_state();
        let app = app(state);

        let response = call(&app, Some(&basic_authorization_header("joe", "joespassword"))).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
