//! Live log rendering for streamed sync events

use crate::display::format_log_line;
use indicatif::{ProgressBar, ProgressStyle};
use invsync_sync::{LogLevel, SyncEvent};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

/// Prints streamed events above a spinner until the sender side closes
pub struct LiveLog {
    spinner: Option<ProgressBar>,
    quiet: bool,
    show_debug: bool,
}

impl LiveLog {
    /// Create a renderer; `quiet` hides everything, `show_debug` adds heartbeats
    pub fn new(quiet: bool, show_debug: bool) -> Self {
        let spinner = if quiet {
            None
        } else {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            pb.enable_steady_tick(Duration::from_millis(100));
            Some(pb)
        };

        Self {
            spinner,
            quiet,
            show_debug,
        }
    }

    /// Consume events until every sender is dropped
    pub async fn run(self, mut rx: UnboundedReceiver<SyncEvent>) {
        while let Some(event) = rx.recv().await {
            self.handle(&event);
        }
        if let Some(pb) = &self.spinner {
            pb.finish_and_clear();
        }
    }

    fn handle(&self, event: &SyncEvent) {
        if self.quiet {
            return;
        }
        match event {
            SyncEvent::Log { level, message, .. } => {
                if *level == LogLevel::Debug && !self.show_debug {
                    if let Some(pb) = &self.spinner {
                        pb.set_message(message.clone());
                    }
                    return;
                }
                if *level == LogLevel::Info {
                    if let Some(pb) = &self.spinner {
                        pb.set_message(message.clone());
                    }
                }
                self.print(&format_log_line(*level, message));
            }
            SyncEvent::Complete(_) => {
                if let Some(pb) = &self.spinner {
                    pb.set_message("Done");
                }
            }
            SyncEvent::Error { .. } => {
                if let Some(pb) = &self.spinner {
                    pb.set_message("Aborted");
                }
            }
        }
    }

    fn print(&self, line: &str) {
        match &self.spinner {
            Some(pb) => pb.suspend(|| println!("{line}")),
            None => println!("{line}"),
        }
    }
}
