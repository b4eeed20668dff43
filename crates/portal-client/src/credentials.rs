//! Credential cookie codec and anti-forgery token source.
//!
//! One cookie, `GenePattern=<username>|<base64(urlencode(password))>`, is the
//! source of truth for the stored credential. The codec percent-encodes the
//! password before base64 so arbitrary unicode round-trips. Malformed cookie
//! values decode to `None`, never an error.

use std::fmt;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::debug;

/// Name of the credential replay cookie.
pub const LOGIN_COOKIE: &str = "GenePattern";
/// Name of the anti-forgery cookie used as the fallback CSRF source.
pub const CSRF_COOKIE: &str = "csrftoken";
/// Header carrying the anti-forgery token on mutating portal requests.
pub const CSRF_HEADER: &str = "X-CSRFToken";

#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Cookie access as the embedding environment provides it. A browser host
/// bridges to `document.cookie`; [`MemoryCookieJar`] backs everything else.
pub trait CookieJar: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;
    fn set(&self, name: &str, value: &str);
    fn remove(&self, name: &str);
}

/// In-memory jar, one per client session.
#[derive(Default)]
pub struct MemoryCookieJar {
    cookies: RwLock<FxHashMap<String, String>>,
}

impl MemoryCookieJar {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CookieJar for MemoryCookieJar {
    fn get(&self, name: &str) -> Option<String> {
        self.cookies.read().get(name).cloned()
    }

    fn set(&self, name: &str, value: &str) {
        self.cookies.write().insert(name.to_owned(), value.to_owned());
    }

    fn remove(&self, name: &str) {
        self.cookies.write().remove(name);
    }
}

pub fn encode_credential(credential: &Credential) -> String {
    let encoded_password = BASE64.encode(urlencoding::encode(&credential.password).as_bytes());
    format!("{}|{}", credential.username, encoded_password)
}

pub fn decode_credential(raw: &str) -> Option<Credential> {
    let (username, encoded_password) = raw.split_once('|')?;
    let decoded = BASE64.decode(encoded_password).ok()?;
    let percent_encoded = String::from_utf8(decoded).ok()?;
    let password = urlencoding::decode(&percent_encoded).ok()?;
    Some(Credential::new(username, password.into_owned()))
}

/// Reads and writes the credential cookie and sources the anti-forgery token.
pub struct CredentialStore {
    jar: Arc<dyn CookieJar>,
    /// Token rendered into the page's hidden form field, when the embedder
    /// has one. Takes priority over the cookie.
    embedded_csrf: RwLock<Option<String>>,
}

impl CredentialStore {
    pub fn new(jar: Arc<dyn CookieJar>) -> Self {
        Self {
            jar,
            embedded_csrf: RwLock::new(None),
        }
    }

    /// Overwrite semantics, last write wins.
    pub fn save(&self, credential: &Credential) {
        self.jar.set(LOGIN_COOKIE, &encode_credential(credential));
    }

    pub fn load(&self) -> Option<Credential> {
        let raw = self.jar.get(LOGIN_COOKIE)?;
        let credential = decode_credential(&raw);
        if credential.is_none() {
            debug!("credential cookie present but malformed");
        }
        credential
    }

    pub fn set_embedded_csrf(&self, token: Option<String>) {
        *self.embedded_csrf.write() = token;
    }

    /// Drop the embedded token so the cookie becomes the only source again.
    pub fn clear_csrf(&self) {
        *self.embedded_csrf.write() = None;
    }

    /// Embedded form value first, `csrftoken` cookie second, `None` if
    /// neither is present.
    pub fn csrf_token(&self) -> Option<String> {
        if let Some(token) = self.embedded_csrf.read().clone() {
            return Some(token);
        }
        self.jar.get(CSRF_COOKIE)
    }

    /// Store cookies captured from a response into the jar.
    pub fn store_cookies(&self, cookies: &[(String, String)]) {
        for (name, value) in cookies {
            debug!(cookie = %name, "storing response cookie");
            self.jar.set(name, value);
        }
    }

    pub fn jar(&self) -> &Arc<dyn CookieJar> {
        &self.jar
    }
}
