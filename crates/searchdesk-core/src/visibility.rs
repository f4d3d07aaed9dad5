//! Per-bucket show/hide state and clipboard export.

use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::traits::{Clipboard, CopyNotifier, ResultRenderer};
use crate::types::{ResultBucket, ResultSet};

pub const DEFAULT_CONFIRMATION: Duration = Duration::from_millis(1500);

impl ResultSet {
    /// Flip one bucket. Out-of-range indices are ignored.
    pub fn toggle_visible(&mut self, index: usize) {
        if let Some(bucket) = self.buckets_mut().get_mut(index) {
            bucket.visible = !bucket.visible;
        }
    }

    pub fn all_visible(&self) -> bool {
        self.iter().all(|b| b.visible)
    }

    /// All visible: hide all. Otherwise: show all.
    pub fn toggle_all_visible(&mut self) {
        let target = !self.all_visible();
        for bucket in self.buckets_mut() { bucket.visible = target; }
    }

    fn force_visible(&mut self, index: usize) {
        if let Some(bucket) = self.buckets_mut().get_mut(index) {
            bucket.visible = true;
        }
    }
}

/// Renders each bucket as a title line followed by one line per item.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextRenderer;

impl ResultRenderer for PlainTextRenderer {
    fn render_bucket(&self, bucket: &ResultBucket) -> String {
        let mut out = String::new();
        out.push_str(if bucket.display_title.is_empty() { &bucket.asset_type } else { &bucket.display_title });
        for (i, item) in bucket.items.iter().enumerate() {
            let title = item.title().unwrap_or("(untitled)");
            out.push_str(&format!("\n{}. {}", i + 1, title));
            if let Some(url) = item.url() { out.push_str(&format!(" <{url}>")); }
            if let Some(heading) = item.heading_titles() { out.push_str(&format!(" [{heading}]")); }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    pub separator: String,
    pub confirmation: Duration,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self { separator: "\n".to_string(), confirmation: DEFAULT_CONFIRMATION }
    }
}

/// Copies rendered buckets to the clipboard.
pub struct Exporter<R, C, N> {
    renderer: R,
    clipboard: C,
    notifier: N,
    options: ExportOptions,
}

impl<R, C, N> Exporter<R, C, N>
where
    R: ResultRenderer,
    C: Clipboard,
    N: CopyNotifier,
{
    pub fn new(renderer: R, clipboard: C, notifier: N, options: ExportOptions) -> Self {
        Self { renderer, clipboard, notifier, options }
    }

    pub fn clipboard(&self) -> &C {
        &self.clipboard
    }

    /// Make every bucket visible, then copy all of them.
    pub fn export_all(&mut self, results: &mut ResultSet) -> Result<String> {
        for i in 0..results.len() { results.force_visible(i); }
        let text = results
            .iter()
            .map(|b| self.renderer.render_bucket(b))
            .collect::<Vec<_>>()
            .join(&self.options.separator);
        self.copy(text)
    }

    /// Make one bucket visible, then copy it.
    pub fn export_one(&mut self, results: &mut ResultSet, index: usize) -> Result<String> {
        results.force_visible(index);
        let bucket = results
            .get(index)
            .ok_or_else(|| Error::NotFound(format!("result bucket {index}")))?;
        let text = self.renderer.render_bucket(bucket);
        self.copy(text)
    }

    fn copy(&mut self, text: String) -> Result<String> {
        if let Err(e) = self.clipboard.copy(&text) {
            warn!(error = %e, "clipboard copy failed");
            return Err(Error::Operation(format!("clipboard copy failed: {e}")));
        }
        debug!(chars = text.len(), "copied results");
        self.notifier.confirm_copied(self.options.confirmation);
        Ok(text)
    }
}
