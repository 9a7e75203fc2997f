//! Desktop notifications via notify-rust.
//!
//! Actions run after the launcher window has closed, so their outcome is
//! reported here rather than as result items.

use notify_rust::Notification;
use tracing::{debug, warn};

use crate::actions::ellipsis;

const BODY_CHARS: usize = 80;

pub struct Notifier {
    enabled: bool,
}

impl Notifier {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn notify(&self, summary: &str, body: &str) {
        if !self.enabled {
            return;
        }

        debug!("Notification: {summary}");

        if let Err(e) = Notification::new()
            .summary(summary)
            .body(&ellipsis(body, BODY_CHARS))
            .appname("Gemini")
            .timeout(3000)
            .show()
        {
            warn!("Failed to show notification: {e}");
        }
    }
}
