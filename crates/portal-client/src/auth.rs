//! Login flows and token lifecycle.
//!
//! Three backends, three conventions: the portal takes a form login with an
//! anti-forgery header, the hub takes a form login that sets session cookies,
//! and the GenePattern server speaks OAuth2 password grant plus a legacy JSF
//! form. The gateway memoizes the OAuth2 token and the hub session so each
//! is established at most once per client session.
//!
//! Callers on non-critical paths pass `suppress_errors = true`: a missing or
//! rejected credential then resolves with a sentinel instead of an error, so
//! a dashboard can render its public parts without a login.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::cache::CacheSlot;
use crate::config::ServerConfig;
use crate::credentials::{CSRF_HEADER, Credential, CredentialStore, LOGIN_COOKIE};
use crate::error::{PortalError, Result};
use crate::forms;
use crate::transport::{ACCEPT_JSON, ApiRequest, Transport};

/// Exact success message of the password-reset endpoint. Anything else in
/// the response is an error even when the status is 2xx.
pub const PASSWORD_RESET_SENT: &str = "A new password has been emailed to you.";

const REGISTRATION_CLIENT_ID: &str = "GenePattern Notebook Library";
const REGISTRATION_UNREACHABLE: &str =
    "Could not contact the GenePattern server or remote registration unsupported.";

/// Outcome of a token request made with `suppress_errors`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenValue {
    Bearer(String),
    /// No token; carries the reason. Only produced under `suppress_errors`.
    Unavailable(String),
}

impl TokenValue {
    pub fn bearer(&self) -> Option<&str> {
        match self {
            Self::Bearer(token) => Some(token),
            Self::Unavailable(_) => None,
        }
    }
}

/// State of the hub login for this client session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubSession {
    /// The login round-trip completed with this status.
    LoggedIn { status: u16 },
    /// The login ended in a cross-origin redirect the HTTP layer refuses to
    /// follow. The hub has set its cookies by that point, so the session is
    /// treated as established.
    Presumed,
    /// No stored credential; only produced under `suppress_errors` and never
    /// cached.
    Unavailable,
}

#[derive(Debug, Clone)]
pub struct Registration {
    pub username: String,
    pub password: String,
    pub password_confirm: String,
    pub email: String,
}

pub struct AuthGateway {
    transport: Arc<dyn Transport>,
    config: Arc<ServerConfig>,
    store: Arc<CredentialStore>,
    gp_token: CacheSlot<String>,
    hub_session: CacheSlot<HubSession>,
}

impl AuthGateway {
    pub fn new(
        transport: Arc<dyn Transport>,
        config: Arc<ServerConfig>,
        store: Arc<CredentialStore>,
    ) -> Self {
        Self {
            transport,
            config,
            store,
            gp_token: CacheSlot::new("genepattern_token"),
            hub_session: CacheSlot::new("hub_session"),
        }
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    fn credential(&self, suppress_errors: bool) -> Result<Option<Credential>> {
        match self.store.load() {
            Some(credential) => Ok(Some(credential)),
            None if suppress_errors => Ok(None),
            None => Err(PortalError::CredentialsUnavailable(
                "no stored login cookie",
            )),
        }
    }

    /// OAuth2 bearer token for the GenePattern server, memoized for the
    /// session. A cached token is returned even when the credential cookie
    /// has since disappeared.
    pub async fn genepattern_token(&self, suppress_errors: bool, force: bool) -> Result<TokenValue> {
        if !force && let Some(token) = self.gp_token.peek() {
            return Ok(TokenValue::Bearer((*token).clone()));
        }

        let Some(credential) = self.credential(suppress_errors)? else {
            return Ok(TokenValue::Unavailable(
                "no stored login cookie".to_owned(),
            ));
        };

        let result = self
            .gp_token
            .get_with(force, || async {
                let url = format!(
                    "{}?grant_type=password&username={}&password={}&client_id=GenePatternNotebookCatalog-{}",
                    self.config.genepattern("rest/v1/oauth2/token"),
                    urlencoding::encode(&credential.username),
                    urlencoding::encode(&credential.password),
                    urlencoding::encode(&credential.username),
                );
                let response = self
                    .transport
                    .send(ApiRequest::post(url).header(ACCEPT_JSON.0, ACCEPT_JSON.1))
                    .await?
                    .into_result()?;
                let value = response.json()?;
                let token = value
                    .get("access_token")
                    .and_then(|t| t.as_str())
                    .ok_or_else(|| {
                        PortalError::Envelope("token response missing access_token".to_owned())
                    })?;
                info!(username = %credential.username, "obtained GenePattern token");
                Ok(token.to_owned())
            })
            .await;

        match result {
            Ok(token) => Ok(TokenValue::Bearer((*token).clone())),
            Err(e) if suppress_errors => {
                debug!(error = %e, "token request failed, suppressed");
                Ok(TokenValue::Unavailable(e.user_message()))
            }
            Err(e) => Err(e),
        }
    }

    /// Establish a hub session by replaying the stored credential against the
    /// hub login form. Memoized; response cookies land in the jar.
    pub async fn login_to_hub(
        &self,
        suppress_errors: bool,
        force: bool,
        forward_url: Option<&str>,
    ) -> Result<Arc<HubSession>> {
        let Some(credential) = self.credential(suppress_errors)? else {
            // Deliberately not cached: a later login must be able to succeed.
            return Ok(Arc::new(HubSession::Unavailable));
        };

        self.hub_session
            .get_with(force, || async {
                let mut url = self.config.hub("hub/login");
                if let Some(next) = forward_url {
                    url = format!("{url}?next={}", urlencoding::encode(next));
                }
                let request = ApiRequest::post(url).form(vec![
                    ("username".to_owned(), credential.username.clone()),
                    ("password".to_owned(), credential.password.clone()),
                ]);

                match self.transport.send(request).await {
                    Ok(response) => {
                        self.store.store_cookies(&response.cookies);
                        let response = response.into_result()?;
                        info!(username = %credential.username, "logged in to hub");
                        Ok(HubSession::LoggedIn {
                            status: response.status,
                        })
                    }
                    // The hub replies with a cross-origin redirect after
                    // setting its cookies; only that class is downgraded.
                    // Connection and timeout failures stay errors.
                    Err(PortalError::RedirectBlocked(reason)) => {
                        debug!(%reason, "hub login ended in a redirect, session presumed");
                        Ok(HubSession::Presumed)
                    }
                    Err(e) => Err(e),
                }
            })
            .await
    }

    /// Portal login. On success the credential is written to the cookie jar
    /// so later sessions can replay it.
    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        forms::validate_login(username, password)?;

        let mut request = ApiRequest::post(self.config.portal("/rest/api-auth/login/")).form(vec![
            ("username".to_owned(), username.to_owned()),
            ("password".to_owned(), password.to_owned()),
        ]);
        if let Some(token) = self.store.csrf_token() {
            request = request.header(CSRF_HEADER, token);
        }

        let response = self.transport.send(request).await?;
        self.store.store_cookies(&response.cookies);
        response.into_result()?;

        self.store.save(&Credential::new(username, password));
        info!(username, "logged in to portal");
        Ok(())
    }

    /// Legacy JSF login against the GenePattern server, needed before its
    /// non-REST pages will accept the session.
    pub async fn login_to_genepattern(&self, suppress_errors: bool) -> Result<()> {
        let Some(credential) = self.credential(suppress_errors)? else {
            return Ok(());
        };

        let request = ApiRequest::post(self.config.genepattern("pages/login.jsf")).form(vec![
            ("loginForm".to_owned(), "loginForm".to_owned()),
            ("loginForm:signIn".to_owned(), "Sign in".to_owned()),
            ("javax.faces.ViewState".to_owned(), "j_id1".to_owned()),
            ("username".to_owned(), credential.username.clone()),
            ("password".to_owned(), credential.password.clone()),
        ]);

        match self.transport.send(request).await.and_then(|r| {
            self.store.store_cookies(&r.cookies);
            r.into_result()
        }) {
            Ok(_) => {
                debug!(username = %credential.username, "logged in to GenePattern pages");
                Ok(())
            }
            Err(e) if suppress_errors => {
                warn!(error = %e, "GenePattern page login failed, suppressed");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Create a GenePattern account and store the new credential on success.
    pub async fn register(&self, registration: &Registration) -> Result<()> {
        forms::validate_registration(
            &registration.username,
            &registration.password,
            &registration.password_confirm,
            &registration.email,
        )?;

        let request = ApiRequest::post(self.config.genepattern("rest/v1/oauth2/register"))
            .header(ACCEPT_JSON.0, ACCEPT_JSON.1)
            .json(json!({
                "username": registration.username,
                "password": registration.password,
                "email": registration.email,
                "client_id": REGISTRATION_CLIENT_ID,
            }));

        match self.transport.send(request).await?.into_result() {
            Ok(_) => {
                self.store
                    .save(&Credential::new(&registration.username, &registration.password));
                info!(username = %registration.username, "registered new account");
                Ok(())
            }
            // A 404 here means the server predates remote registration.
            Err(PortalError::Rejected { status: 404, .. }) => Err(PortalError::Rejected {
                status: 404,
                message: REGISTRATION_UNREACHABLE.to_owned(),
            }),
            Err(e) => Err(e),
        }
    }

    /// Request a password reset email. The endpoint reports failure in the
    /// body of a 2xx response, so success is the exact sentinel message.
    pub async fn forgot_password(&self, username_or_email: &str) -> Result<String> {
        forms::validate_reset(username_or_email)?;

        let request = ApiRequest::put(self.config.genepattern("rest/v1/oauth2/forgot-password"))
            .header(ACCEPT_JSON.0, ACCEPT_JSON.1)
            .json(json!({ "usernameOrEmail": username_or_email }));

        let response = self.transport.send(request).await?.into_result()?;
        // The outcome is reported under a `message` key; older servers
        // return the string bare.
        let message = response
            .json()
            .ok()
            .and_then(|v| {
                v.get("message")
                    .and_then(Value::as_str)
                    .or_else(|| v.as_str())
                    .map(str::to_owned)
            })
            .unwrap_or_else(|| response.body.trim().to_owned());

        if message == PASSWORD_RESET_SENT {
            Ok(message)
        } else {
            Err(PortalError::Rejected {
                status: response.status,
                message,
            })
        }
    }

    /// Drop the stored credential and every session-scoped token.
    pub fn logout(&self) {
        self.store.jar().remove(LOGIN_COOKIE);
        self.gp_token.invalidate();
        self.hub_session.invalidate();
        info!("logged out");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::MemoryCookieJar;
    use crate::error::ValidationFailure;
    use crate::transport::{ApiResponse, MockTransport, RequestBody};

    fn response(status: u16, body: &str) -> ApiResponse {
        ApiResponse {
            status,
            status_text: if status == 200 { "OK" } else { "Error" }.to_owned(),
            body: body.to_owned(),
            cookies: vec![],
        }
    }

    fn gateway(mock: MockTransport) -> AuthGateway {
        AuthGateway::new(
            Arc::new(mock),
            Arc::new(ServerConfig::default()),
            Arc::new(CredentialStore::new(Arc::new(MemoryCookieJar::new()))),
        )
    }

    fn gateway_with_credential(mock: MockTransport) -> AuthGateway {
        let gateway = gateway(mock);
        gateway.store.save(&Credential::new("alice", "pw"));
        gateway
    }

    #[tokio::test]
    async fn token_is_memoized_for_the_session() {
        let mut mock = MockTransport::new();
        mock.expect_send()
            .times(1)
            .returning(|_| Ok(response(200, r#"{"access_token": "tok-1"}"#)));
        let gateway = gateway_with_credential(mock);

        let first = gateway.genepattern_token(false, false).await.unwrap();
        let second = gateway.genepattern_token(false, false).await.unwrap();
        assert_eq!(first, TokenValue::Bearer("tok-1".to_owned()));
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn force_refetches_the_token() {
        let mut mock = MockTransport::new();
        mock.expect_send()
            .times(2)
            .returning(|_| Ok(response(200, r#"{"access_token": "tok"}"#)));
        let gateway = gateway_with_credential(mock);

        gateway.genepattern_token(false, false).await.unwrap();
        gateway.genepattern_token(false, true).await.unwrap();
    }

    #[tokio::test]
    async fn token_request_encodes_credentials_into_query() {
        let mut mock = MockTransport::new();
        mock.expect_send()
            .times(1)
            .withf(|request| {
                request.url.contains("grant_type=password")
                    && request.url.contains("username=a%40b")
                    && request.url.contains("client_id=GenePatternNotebookCatalog-a%40b")
            })
            .returning(|_| Ok(response(200, r#"{"access_token": "tok"}"#)));
        let gateway = gateway(mock);
        gateway.store.save(&Credential::new("a@b", "pw"));

        gateway.genepattern_token(false, false).await.unwrap();
    }

    #[tokio::test]
    async fn missing_credential_follows_the_suppress_contract() {
        let gateway = gateway(MockTransport::new());

        let suppressed = gateway.genepattern_token(true, false).await.unwrap();
        assert!(matches!(suppressed, TokenValue::Unavailable(_)));

        let err = gateway.genepattern_token(false, false).await.unwrap_err();
        assert!(matches!(err, PortalError::CredentialsUnavailable(_)));
    }

    #[tokio::test]
    async fn rejected_token_is_suppressed_but_retryable() {
        let mut mock = MockTransport::new();
        mock.expect_send()
            .times(2)
            .returning(|_| Ok(response(400, r#"{"error": "Invalid username or password"}"#)));
        let gateway = gateway_with_credential(mock);

        let suppressed = gateway.genepattern_token(true, false).await.unwrap();
        assert_eq!(
            suppressed,
            TokenValue::Unavailable("Invalid username or password".to_owned())
        );

        // The failure was not cached; the next call retries and rejects.
        let err = gateway.genepattern_token(false, false).await.unwrap_err();
        assert!(matches!(err, PortalError::Rejected { status: 400, .. }));
    }

    #[tokio::test]
    async fn hub_login_is_memoized_and_stores_cookies() {
        let mut mock = MockTransport::new();
        mock.expect_send().times(1).returning(|request| {
            assert!(request.url.contains("hub/login"));
            assert!(matches!(request.body, Some(RequestBody::Form(_))));
            Ok(ApiResponse {
                status: 200,
                status_text: "OK".to_owned(),
                body: String::new(),
                cookies: vec![("jupyterhub-session-id".to_owned(), "s1".to_owned())],
            })
        });
        let gateway = gateway_with_credential(mock);

        let first = gateway
            .login_to_hub(false, false, Some("/hub/home"))
            .await
            .unwrap();
        let second = gateway.login_to_hub(false, false, None).await.unwrap();
        assert_eq!(*first, HubSession::LoggedIn { status: 200 });
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(
            gateway.store.jar().get("jupyterhub-session-id").as_deref(),
            Some("s1")
        );
    }

    #[tokio::test]
    async fn blocked_redirect_counts_as_hub_login() {
        let mut mock = MockTransport::new();
        mock.expect_send().times(1).returning(|_| {
            Err(PortalError::RedirectBlocked(
                "cross-origin redirect".to_owned(),
            ))
        });
        let gateway = gateway_with_credential(mock);

        let session = gateway.login_to_hub(false, false, None).await.unwrap();
        assert_eq!(*session, HubSession::Presumed);

        // The presumed session is cached like a real one.
        let again = gateway.login_to_hub(false, false, None).await.unwrap();
        assert!(Arc::ptr_eq(&session, &again));
    }

    #[tokio::test]
    async fn connection_failures_are_not_presumed_logins() {
        let mut mock = MockTransport::new();
        mock.expect_send().times(1).returning(|_| {
            Ok(ApiResponse {
                status: 503,
                status_text: "Service Unavailable".to_owned(),
                body: String::new(),
                cookies: vec![],
            })
        });
        let gateway = gateway_with_credential(mock);

        let err = gateway.login_to_hub(false, false, None).await.unwrap_err();
        assert!(matches!(err, PortalError::Rejected { status: 503, .. }));
    }

    #[tokio::test]
    async fn hub_login_force_repeats_the_round_trip() {
        let mut mock = MockTransport::new();
        mock.expect_send()
            .times(2)
            .returning(|_| Ok(response(200, "")));
        let gateway = gateway_with_credential(mock);

        gateway.login_to_hub(false, false, None).await.unwrap();
        gateway.login_to_hub(false, true, None).await.unwrap();
    }

    #[tokio::test]
    async fn hub_login_without_credential_is_not_cached() {
        let mut mock = MockTransport::new();
        mock.expect_send()
            .times(1)
            .returning(|_| Ok(response(200, "")));
        let gateway = gateway(mock);

        let session = gateway.login_to_hub(true, false, None).await.unwrap();
        assert_eq!(*session, HubSession::Unavailable);

        // A credential arriving later must still produce a real login.
        gateway.store.save(&Credential::new("alice", "pw"));
        let session = gateway.login_to_hub(true, false, None).await.unwrap();
        assert_eq!(*session, HubSession::LoggedIn { status: 200 });
    }

    #[tokio::test]
    async fn portal_login_saves_the_credential_cookie() {
        let mut mock = MockTransport::new();
        mock.expect_send()
            .times(1)
            .returning(|_| Ok(response(200, "")));
        let gateway = gateway(mock);

        gateway.login("alice", "pw").await.unwrap();
        let stored = gateway.store.load().unwrap();
        assert_eq!(stored.username, "alice");
        assert_eq!(stored.password, "pw");
    }

    #[tokio::test]
    async fn blank_login_never_reaches_the_network() {
        let gateway = gateway(MockTransport::new());
        let err = gateway.login("", "pw").await.unwrap_err();
        assert!(matches!(
            err,
            PortalError::Validation(ValidationFailure::BlankUsername)
        ));
    }

    #[tokio::test]
    async fn rejected_login_does_not_save_the_credential() {
        let mut mock = MockTransport::new();
        mock.expect_send()
            .times(1)
            .returning(|_| Ok(response(403, r#"{"error": "bad password"}"#)));
        let gateway = gateway(mock);

        let err = gateway.login("alice", "wrong").await.unwrap_err();
        assert!(matches!(err, PortalError::Rejected { status: 403, .. }));
        assert!(gateway.store.load().is_none());
    }

    #[tokio::test]
    async fn registration_maps_404_to_unreachable_message() {
        let mut mock = MockTransport::new();
        mock.expect_send()
            .times(1)
            .returning(|_| Ok(response(404, "")));
        let gateway = gateway(mock);

        let err = gateway
            .register(&Registration {
                username: "alice".to_owned(),
                password: "pw".to_owned(),
                password_confirm: "pw".to_owned(),
                email: "alice@example.com".to_owned(),
            })
            .await
            .unwrap_err();
        match err {
            PortalError::Rejected { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, REGISTRATION_UNREACHABLE);
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn successful_registration_stores_the_credential() {
        let mut mock = MockTransport::new();
        mock.expect_send()
            .times(1)
            .returning(|_| Ok(response(200, "{}")));
        let gateway = gateway(mock);

        gateway
            .register(&Registration {
                username: "bob".to_owned(),
                password: "pw".to_owned(),
                password_confirm: "pw".to_owned(),
                email: "bob@example.com".to_owned(),
            })
            .await
            .unwrap();
        assert_eq!(gateway.store.load().unwrap().username, "bob");
    }

    #[tokio::test]
    async fn forgot_password_reads_the_message_field() {
        let mut mock = MockTransport::new();
        mock.expect_send().times(1).returning(|_| {
            Ok(response(
                200,
                r#"{"message": "A new password has been emailed to you."}"#,
            ))
        });
        let gateway = gateway(mock);

        let message = gateway.forgot_password("alice").await.unwrap();
        assert_eq!(message, PASSWORD_RESET_SENT);
    }

    #[tokio::test]
    async fn forgot_password_accepts_a_bare_string_body() {
        let mut mock = MockTransport::new();
        mock.expect_send()
            .times(1)
            .returning(|_| Ok(response(200, r#""A new password has been emailed to you.""#)));
        let gateway = gateway(mock);

        let message = gateway.forgot_password("alice").await.unwrap();
        assert_eq!(message, PASSWORD_RESET_SENT);
    }

    #[tokio::test]
    async fn forgot_password_rejects_other_2xx_messages() {
        let mut mock = MockTransport::new();
        mock.expect_send()
            .times(1)
            .returning(|_| Ok(response(200, r#"{"message": "Username not found"}"#)));
        let gateway = gateway(mock);

        let err = gateway.forgot_password("nobody").await.unwrap_err();
        match err {
            PortalError::Rejected { message, .. } => assert_eq!(message, "Username not found"),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn logout_clears_cookie_and_cached_token() {
        let mut mock = MockTransport::new();
        mock.expect_send()
            .times(2)
            .returning(|_| Ok(response(200, r#"{"access_token": "tok"}"#)));
        let gateway = gateway_with_credential(mock);

        gateway.genepattern_token(false, false).await.unwrap();
        gateway.logout();
        assert!(gateway.store.load().is_none());

        // A fresh login produces a fresh token fetch.
        gateway.store.save(&Credential::new("alice", "pw"));
        gateway.genepattern_token(false, false).await.unwrap();
    }
}
