//! Client layer for the notebook portal.
//!
//! This crate is the headless half of the notebook library portal: it talks
//! to the portal REST API, the notebook hub, and the GenePattern server, and
//! hands the embedder ready-to-render data. It owns:
//!
//! - session-scoped caching of every listed resource ([`session`])
//! - the credential cookie codec and CSRF sourcing ([`credentials`])
//! - login flows and token lifecycle across all three backends ([`auth`])
//! - project CRUD, sharing, and publishing ([`projects`])
//! - background polling of per-user server status ([`poll`])
//! - headless dialog and notification state ([`dialog`])
//!
//! Rendering, routing, and DOM concerns stay with the embedder. Everything
//! network-facing goes through the [`transport::Transport`] seam so tests
//! run without a server.

pub mod auth;
pub mod cache;
pub mod config;
pub mod credentials;
pub mod dialog;
pub mod error;
pub mod forms;
pub mod poll;
pub mod projects;
pub mod session;
pub mod transport;

pub use auth::{AuthGateway, HubSession, Registration, TokenValue};
pub use cache::CacheSlot;
pub use config::ServerConfig;
pub use credentials::{Credential, CredentialStore, MemoryCookieJar};
pub use dialog::{Dialog, DialogConfig, Notice, Notifier, Severity};
pub use error::{PortalError, Result, ValidationFailure};
pub use poll::{UserStatusSource, spawn_status_poll};
pub use projects::{Project, ProjectClient, ProjectForm, UserStatus};
pub use session::SessionCache;
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Transport};
