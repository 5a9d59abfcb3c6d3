//! Publication: one summary message, then one message per page, in order.
//!
//! Sends are sequential with a fixed pause between them to stay under the
//! chat platform's rate limits. A failed message is logged and skipped; the
//! caller decides from the [`DeliveryReport`] whether the batch counts as
//! published.

use crate::chat::{ChannelHandle, ChatService, Embed, OutboundMessage};
use crate::pipeline::render::RenderedPage;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

const SUMMARY_COLOR: u32 = 0x00ff00;
const PAGE_COLOR: u32 = 0x0099ff;
const FOOTER: &str = "Substitutions";

/// Everything published for one detected change.
#[derive(Debug, Clone)]
pub struct PublicationBatch {
    /// `DD.MM.YYYY`, from the filename or the current date.
    pub date_label: String,
    pub source_link: String,
    /// Pages `1..=N` in ascending order; may be empty.
    pub pages: Vec<RenderedPage>,
}

/// Outcome of sending a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub attempted: usize,
    pub delivered: usize,
    pub summary_delivered: bool,
}

impl DeliveryReport {
    pub fn nothing_delivered(&self) -> bool {
        self.delivered == 0
    }

    pub fn failed(&self) -> usize {
        self.attempted - self.delivered
    }
}

fn page_count(n: usize) -> String {
    match n {
        1 => "1 page".to_string(),
        n => format!("{n} pages"),
    }
}

/// The announcement that precedes the pages.
pub fn summary_message(batch: &PublicationBatch) -> OutboundMessage {
    let embed = Embed::titled("📋 New substitutions")
        .description("A new substitutions document is available.")
        .color(SUMMARY_COLOR)
        .field("📅 Date", &batch.date_label, true)
        .field("🔗 Download", format!("[Open PDF]({})", batch.source_link), false)
        .field("🖼️ Pages", page_count(batch.pages.len()), true)
        .footer(FOOTER);
    OutboundMessage::embed(embed)
}

/// Message carrying one rendered page.
pub fn page_message(page: RenderedPage, total: usize, date_label: &str) -> OutboundMessage {
    let filename = page.file_name();
    let embed = Embed::titled(format!("📄 Page {}/{}", page.index, total))
        .color(PAGE_COLOR)
        .field("📅 Date", date_label, true)
        .field("📄 Page", format!("{} of {}", page.index, total), true)
        .attached_image(&filename)
        .footer(format!("{FOOTER} | Page {}", page.index));
    OutboundMessage::embed(embed).with_attachment(filename, page.png)
}

/// Send the summary and every page, pausing `delay` between consecutive sends.
pub async fn publish(
    chat: &dyn ChatService,
    channel: &ChannelHandle,
    batch: PublicationBatch,
    delay: Duration,
) -> DeliveryReport {
    let total = batch.pages.len();
    let mut report = DeliveryReport {
        attempted: 1 + total,
        ..DeliveryReport::default()
    };

    match chat.send(channel, &summary_message(&batch)).await {
        Ok(()) => {
            report.delivered += 1;
            report.summary_delivered = true;
        }
        Err(e) => warn!("Summary message failed: {}", e),
    }

    for page in batch.pages {
        tokio::time::sleep(delay).await;
        let index = page.index;
        match chat.send(channel, &page_message(page, total, &batch.date_label)).await {
            Ok(()) => {
                debug!("Sent page {}/{}", index, total);
                report.delivered += 1;
            }
            Err(e) => warn!("Page {}/{} failed: {}", index, total, e),
        }
    }

    info!(
        "Published {} of {} messages for {}",
        report.delivered, report.attempted, batch.source_link
    );
    report
}

/// Write pages to `<dir>/<date label>/page_<n>.png`.
pub async fn archive_pages(dir: &Path, batch: &PublicationBatch) -> std::io::Result<PathBuf> {
    let folder = dir.join(&batch.date_label);
    tokio::fs::create_dir_all(&folder).await?;
    for page in &batch.pages {
        tokio::fs::write(folder.join(page.file_name()), &page.png).await?;
    }
    debug!("Archived {} pages to {}", batch.pages.len(), folder.display());
    Ok(folder)
}
