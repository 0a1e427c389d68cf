//! Terminal rendering of pipeline progress events.
//!
//! Three renderers cover the CLI's output modes: indicatif bars with color
//! (default), plain uncolored lines (`--no-color`), and silence (`--quiet`).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use eprints2archives_core::{ProgressSink, ServiceStatus, SilentProgress};

/// Picks the renderer for the requested output mode.
pub fn make_progress(quiet: bool, no_color: bool) -> Arc<dyn ProgressSink> {
    if quiet {
        Arc::new(SilentProgress)
    } else if no_color {
        Arc::new(PlainProgress)
    } else {
        Arc::new(TermProgress::new())
    }
}

/// Status line for a service row.
fn status_text(service: &str, status: ServiceStatus) -> String {
    match status {
        ServiceStatus::Running => format!("Sending URLs to {service} ..."),
        ServiceStatus::PausedRateLimit => format!("Paused for rate limit at {service} ..."),
        ServiceStatus::PausedError => format!("Paused due to {service} error; will retry ..."),
        ServiceStatus::Unavailable => format!("No response from {service} servers"),
    }
}

/// Line-oriented renderer used when colors are disabled.
struct PlainProgress;

impl ProgressSink for PlainProgress {
    fn info(&self, message: &str) {
        println!("{message}");
    }

    fn warning(&self, message: &str) {
        eprintln!("warning: {message}");
    }

    fn gather_started(&self, description: &str, total: usize) {
        println!("{description} ({total} items) ...");
    }

    fn service_started(&self, service: &'static str, _color: &'static str, total: usize) {
        println!("Sending {total} URLs to {service} ...");
    }

    fn service_status(&self, service: &'static str, status: ServiceStatus) {
        if status != ServiceStatus::Running {
            println!("{}", status_text(service, status));
        }
    }

    fn service_finished(&self, service: &'static str) {
        println!("Finished sending URLs to {service}.");
    }
}

/// Indicatif-based renderer: one bar for the current gather phase and one
/// row per archive service showing added/skipped counters.
struct TermProgress {
    multi: MultiProgress,
    gather: Mutex<Option<ProgressBar>>,
    services: Mutex<HashMap<&'static str, ProgressBar>>,
}

impl TermProgress {
    fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            gather: Mutex::new(None),
            services: Mutex::new(HashMap::new()),
        }
    }

    fn bar_style(color: &str) -> ProgressStyle {
        let template = format!("{{prefix:.{color}}} {{bar:30}} {{pos}}/{{len}} {{msg}}");
        ProgressStyle::with_template(&template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
    }

    fn with_service_bar(&self, service: &'static str, apply: impl FnOnce(&ProgressBar)) {
        if let Ok(bars) = self.services.lock()
            && let Some(bar) = bars.get(service)
        {
            apply(bar);
        }
    }
}

impl ProgressSink for TermProgress {
    fn info(&self, message: &str) {
        let _ = self.multi.println(message);
    }

    fn warning(&self, message: &str) {
        let _ = self.multi.println(format!("warning: {message}"));
    }

    fn gather_started(&self, description: &str, total: usize) {
        let bar = self.multi.add(ProgressBar::new(total as u64));
        bar.set_style(Self::bar_style("green"));
        bar.set_prefix(description.to_string());
        if let Ok(mut slot) = self.gather.lock() {
            if let Some(previous) = slot.take() {
                previous.finish_and_clear();
            }
            *slot = Some(bar);
        }
    }

    fn gather_tick(&self) {
        if let Ok(slot) = self.gather.lock()
            && let Some(bar) = slot.as_ref()
        {
            bar.inc(1);
        }
    }

    fn gather_finished(&self) {
        if let Ok(mut slot) = self.gather.lock()
            && let Some(bar) = slot.take()
        {
            bar.finish();
        }
    }

    fn service_started(&self, service: &'static str, color: &'static str, total: usize) {
        let bar = self.multi.add(ProgressBar::new(total as u64));
        bar.set_style(Self::bar_style(color));
        bar.set_prefix(status_text(service, ServiceStatus::Running));
        bar.set_message("0 added/0 skipped");
        if let Ok(mut bars) = self.services.lock() {
            bars.insert(service, bar);
        }
    }

    fn service_status(&self, service: &'static str, status: ServiceStatus) {
        self.with_service_bar(service, |bar| {
            bar.set_prefix(status_text(service, status));
        });
    }

    fn service_progress(&self, service: &'static str, added: u64, skipped: u64) {
        self.with_service_bar(service, |bar| {
            bar.set_position(added + skipped);
            bar.set_message(format!("{added} added/{skipped} skipped"));
        });
    }

    fn service_finished(&self, service: &'static str) {
        self.with_service_bar(service, ProgressBar::finish);
    }
}
