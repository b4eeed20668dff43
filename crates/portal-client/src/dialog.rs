//! Headless dialog and notification state.
//!
//! The crate owns dialog configuration and lifecycle; rendering belongs to
//! the embedder. A [`Dialog`] tracks open/spinner state and dispatches button
//! presses, a [`Notifier`] fans transient notices out to whoever subscribed.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonStyle {
    Primary,
    Secondary,
    Danger,
    OutlineSecondary,
}

/// What pressing a button does. Every press closes the dialog first.
#[derive(Clone)]
pub enum DialogAction {
    Dismiss,
    Custom(Arc<dyn Fn() + Send + Sync>),
}

impl fmt::Debug for DialogAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dismiss => f.write_str("Dismiss"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ButtonConfig {
    pub style: ButtonStyle,
    pub action: DialogAction,
}

impl ButtonConfig {
    pub fn new(style: ButtonStyle, action: DialogAction) -> Self {
        Self { style, action }
    }

    pub fn dismiss(style: ButtonStyle) -> Self {
        Self::new(style, DialogAction::Dismiss)
    }
}

#[derive(Debug, Clone, Default)]
pub enum DialogBody {
    #[default]
    Empty,
    Text(String),
    /// Pre-rendered markup the embedder injects verbatim. The caller is
    /// responsible for its safety.
    Markup(String),
}

#[derive(Debug, Clone)]
pub struct DialogConfig {
    pub title: String,
    pub body: DialogBody,
    /// Label/config pairs in display order.
    pub buttons: Vec<(String, ButtonConfig)>,
}

impl DialogConfig {
    /// A dialog with the default single OK button that dismisses it.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: DialogBody::Empty,
            buttons: vec![(
                "OK".to_owned(),
                ButtonConfig::dismiss(ButtonStyle::Primary),
            )],
        }
    }

    pub fn body_text(mut self, text: impl Into<String>) -> Self {
        self.body = DialogBody::Text(text.into());
        self
    }

    pub fn body_markup(mut self, markup: impl Into<String>) -> Self {
        self.body = DialogBody::Markup(markup.into());
        self
    }

    /// Replaces the default button set.
    pub fn buttons(mut self, buttons: Vec<(String, ButtonConfig)>) -> Self {
        self.buttons = buttons;
        self
    }
}

/// Open dialog instance. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Dialog {
    config: Arc<DialogConfig>,
    state: Arc<Mutex<DialogState>>,
}

#[derive(Default)]
struct DialogState {
    open: bool,
    spinner: bool,
}

impl Dialog {
    pub fn open(config: DialogConfig) -> Self {
        debug!(title = %config.title, "opening dialog");
        Self {
            config: Arc::new(config),
            state: Arc::new(Mutex::new(DialogState {
                open: true,
                spinner: false,
            })),
        }
    }

    pub fn config(&self) -> &DialogConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    pub fn spinner_visible(&self) -> bool {
        self.state.lock().spinner
    }

    pub fn show_spinner(&self) {
        self.state.lock().spinner = true;
    }

    pub fn hide_spinner(&self) {
        self.state.lock().spinner = false;
    }

    pub fn close(&self) {
        let mut state = self.state.lock();
        state.open = false;
        state.spinner = false;
    }

    /// Dispatch the button with the given label: close the dialog, then run
    /// the button's action. Unknown labels are ignored.
    pub fn press(&self, label: &str) {
        let Some((_, button)) = self
            .config
            .buttons
            .iter()
            .find(|(name, _)| name == label)
        else {
            debug!(label, "press on unknown dialog button");
            return;
        };
        self.close();
        if let DialogAction::Custom(action) = &button.action {
            action();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Danger,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub text: String,
    pub severity: Severity,
}

impl Notice {
    pub fn new(text: impl Into<String>, severity: Severity) -> Self {
        Self {
            text: text.into(),
            severity,
        }
    }
}

/// Fan-out channel for transient notices. Subscribers added after a post do
/// not see it.
#[derive(Default)]
pub struct Notifier {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<Notice>>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<Notice> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn post(&self, notice: Notice) {
        debug!(severity = ?notice.severity, text = %notice.text, "posting notice");
        // Dropped receivers are pruned on the next post.
        self.subscribers
            .lock()
            .retain(|tx| tx.send(notice.clone()).is_ok());
    }

    pub fn info(&self, text: impl Into<String>) {
        self.post(Notice::new(text, Severity::Info));
    }

    pub fn success(&self, text: impl Into<String>) {
        self.post(Notice::new(text, Severity::Success));
    }

    pub fn warning(&self, text: impl Into<String>) {
        self.post(Notice::new(text, Severity::Warning));
    }

    pub fn danger(&self, text: impl Into<String>) {
        self.post(Notice::new(text, Severity::Danger));
    }

    /// Standard handling for a failed request: post the user-facing message
    /// as a danger notice and close the dialog that triggered it, if any.
    pub fn report_failure(&self, error: &crate::error::PortalError, dialog: Option<&Dialog>) {
        if let Some(dialog) = dialog {
            dialog.close();
        }
        self.danger(error.user_message());
    }
}
