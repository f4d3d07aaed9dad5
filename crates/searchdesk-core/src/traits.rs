//! Seams to the presentation layer. Front ends implement these; the pipeline
//! only ever talks to them through the trait objects.

use std::time::Duration;

use crate::types::ResultBucket;

/// Busy indicator shown while a backend call is in flight.
pub trait LoadingIndicator: Send + Sync {
    fn show(&self);
    fn hide(&self);
}

/// Asks the user for a username when none can be resolved.
pub trait UsernamePrompt: Send + Sync {
    fn prompt_for_username(&self);
}

/// Named tracking values supplied by the host (browser cookies, env, ...).
pub trait TokenSource {
    fn token(&self, key: &str) -> Option<String>;
}

/// Produces the textual content of one bucket as the user sees it.
pub trait ResultRenderer {
    fn render_bucket(&self, bucket: &ResultBucket) -> String;
}

pub trait Clipboard {
    fn copy(&mut self, text: &str) -> anyhow::Result<()>;
}

/// Transient "copied" confirmation.
pub trait CopyNotifier {
    fn confirm_copied(&self, duration: Duration);
}

/// Indicator for headless use.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopIndicator;

impl LoadingIndicator for NoopIndicator {
    fn show(&self) {}
    fn hide(&self) {}
}

/// Shows the indicator on creation and hides it when dropped, so every exit
/// path of a submission hides it.
pub struct LoadingGuard<'a> {
    indicator: &'a dyn LoadingIndicator,
}

impl<'a> LoadingGuard<'a> {
    pub fn show(indicator: &'a dyn LoadingIndicator) -> Self {
        indicator.show();
        Self { indicator }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.indicator.hide();
    }
}
