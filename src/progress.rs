//! Terminal rendering of pipeline events.

use crate::events::{PipelineEvent, Stage, StageEvent};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc::UnboundedReceiver;

const BYTES_TEMPLATE: &str =
    "{spinner:.cyan} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg} | {elapsed_precise} elapsed";
const COUNT_TEMPLATE: &str =
    "{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg} | {elapsed_precise} elapsed";

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓▒░ ")
}

/// Draws a single progress bar from stage events.
///
/// Byte progress is shown while fetching, archive counts while extracting.
/// Status lines and per-item errors are printed above the bar.
pub struct ProgressRenderer {
    pb: ProgressBar,
}

impl ProgressRenderer {
    /// A hidden renderer still accepts events but draws nothing.
    pub fn new(visible: bool) -> Self {
        let pb = if visible {
            ProgressBar::new(0)
        } else {
            ProgressBar::hidden()
        };
        pb.set_style(style(BYTES_TEMPLATE));
        Self { pb }
    }

    pub fn handle(&self, event: &StageEvent) {
        match &event.event {
            PipelineEvent::Started { message } => {
                self.pb.println(format!("[{}] {}", event.stage, message));
            }
            PipelineEvent::ItemStarted { name, index } => match event.stage {
                Stage::Fetch => {
                    self.pb.set_style(style(BYTES_TEMPLATE));
                    self.pb.set_length(0);
                    self.pb.set_position(0);
                    self.pb.set_message(format!("| ⬇️  #{} {}", index + 1, name));
                }
                Stage::Extract => {
                    self.pb.set_style(style(COUNT_TEMPLATE));
                    self.pb.set_message(format!("| 📂 Extracting: {}", name));
                }
            },
            PipelineEvent::Progress { received, total } => {
                self.pb.set_length(*total);
                self.pb.set_position(*received);
            }
            PipelineEvent::ItemFinished => self.pb.tick(),
            PipelineEvent::Error(e) => {
                let marker = if e.is_warning() { "⚠️ " } else { "❌" };
                self.pb.println(format!("{} {}", marker, e));
            }
            PipelineEvent::Finished { paths, .. } => {
                self.pb.println(format!(
                    "✅ {} stage finished with {} file(s)",
                    event.stage,
                    paths.len()
                ));
            }
        }
    }

    /// Renders events until every sender is dropped.
    pub async fn drain(self, mut rx: UnboundedReceiver<StageEvent>) {
        while let Some(event) = rx.recv().await {
            self.handle(&event);
        }
        self.pb.finish_and_clear();
    }
}
