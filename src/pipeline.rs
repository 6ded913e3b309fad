/*!
 * Copyright (c) 2026 Ming Lyu, aka mingcheng
 *
 * This source code is licensed under the MIT License,
 * which is located in the LICENSE file in the source tree's root directory.
 *
 * File: pipeline.rs
 * Author: mingcheng <mingcheng@apache.org>
 * File Created: 2026-03-03 15:18:36
 *
 * Modified By: mingcheng <mingcheng@apache.org>
 * Last Modified: 2026-03-05 17:26:44
 */

use crate::attachment_detector::filter_messages_with_pdf;
use crate::config::{AppConfig, MailboxConfig};
use crate::error::PipelineError;
use crate::imap_session::ImapConnector;
use crate::pdf_extractor::{ExtractOutcome, PdfExtractor};
use crate::stream_collector::collect_text;
use crate::traits::{
    FetchProjection, MailboxConnector, MailboxSession, MessageId, MessagePayload,
    MimePartDescriptor, SearchCriterion,
};
use log::{debug, error, info, warn};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

#[cfg(test)]
#[path = "./pipeline_tests.rs"]
mod pipeline_tests;

/// Pipeline progress. Linear; any failure jumps straight to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Disconnected,
    Connecting,
    MailboxOpen,
    Searched,
    StructureFetched,
    Filtered,
    BodyFetched,
    Extracting,
    Closed,
    Failed,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub found: usize,
    pub matched: usize,
    pub written: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} found, {} with a PDF part, {} written, {} skipped, {} failed",
            self.found, self.matched, self.written, self.skipped, self.failed
        )
    }
}

pub struct Pipeline {
    config: MailboxConfig,
    criterion: SearchCriterion,
    connector: Arc<dyn MailboxConnector>,
    extractor: PdfExtractor,
    state: PipelineState,
    history: Vec<PipelineState>,
}

impl Pipeline {
    pub fn new(config: &AppConfig) -> Self {
        Self::new_with(
            config.mailbox.clone(),
            config.search_criterion(),
            Arc::new(ImapConnector),
            PdfExtractor::new(config.destination_folder.clone()),
        )
    }

    pub fn new_with(
        config: MailboxConfig,
        criterion: SearchCriterion,
        connector: Arc<dyn MailboxConnector>,
        extractor: PdfExtractor,
    ) -> Self {
        Self {
            config,
            criterion,
            connector,
            extractor,
            state: PipelineState::Disconnected,
            history: vec![PipelineState::Disconnected],
        }
    }

    #[allow(dead_code)]
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Every state entered so far, starting with `Disconnected`.
    #[allow(dead_code)]
    pub fn history(&self) -> &[PipelineState] {
        &self.history
    }

    fn transition(&mut self, next: PipelineState) {
        debug!("Pipeline state {:?} -> {:?}", self.state, next);
        self.state = next;
        self.history.push(next);
    }

    /// Runs one scan. The session, once connected, is closed on every exit path.
    pub async fn run(&mut self) -> Result<RunReport, PipelineError> {
        self.transition(PipelineState::Connecting);

        let mut session = match self.connector.connect(&self.config).await {
            Ok(session) => session,
            Err(e) => {
                self.transition(PipelineState::Failed);
                return Err(e);
            }
        };
        info!(
            "Connected to {}:{} as {}",
            self.config.host, self.config.port, self.config.username
        );

        let result = self.run_session(session.as_mut()).await;
        session.close().await;

        match &result {
            Ok(_) => self.transition(PipelineState::Closed),
            Err(_) => self.transition(PipelineState::Failed),
        }
        result
    }

    async fn run_session(
        &mut self,
        session: &mut dyn MailboxSession,
    ) -> Result<RunReport, PipelineError> {
        let mut report = RunReport::default();

        let mailbox = session.open_mailbox(&self.config.folder, true).await?;
        self.transition(PipelineState::MailboxOpen);
        info!(
            "Opened mailbox {} ({} messages, read-only: {})",
            mailbox.name, mailbox.exists, mailbox.read_only
        );

        let ids = session.search(&self.criterion).await?;
        self.transition(PipelineState::Searched);
        report.found = ids.len();
        info!("Search {} matched {} messages", self.criterion, ids.len());
        if ids.is_empty() {
            return Ok(report);
        }

        let structures = fetch_structures(session, &ids).await?;
        self.transition(PipelineState::StructureFetched);

        let matched = filter_messages_with_pdf(&structures);
        for id in &ids {
            if matched.contains(id) {
                info!("[{}] PDF attachment detected", id);
            } else if structures.contains_key(id) {
                info!("[{}] No PDF attachment", id);
            } else {
                warn!("[{}] Server returned no structure", id);
            }
        }
        self.transition(PipelineState::Filtered);
        report.matched = matched.len();
        if matched.is_empty() {
            return Ok(report);
        }

        let wanted: Vec<MessageId> = matched.iter().copied().collect();
        let mut handle = session.fetch(&wanted, FetchProjection::BodyText).await?;
        let mut processed = HashSet::new();

        while let Some(message) = handle.next_message().await {
            if !matched.contains(&message.id) {
                warn!("[{}] Unrequested message in body fetch, ignoring", message.id);
                continue;
            }
            if processed.contains(&message.id) {
                warn!("[{}] Body delivered again, ignoring", message.id);
                continue;
            }
            let MessagePayload::Body(body) = message.payload else {
                warn!("[{}] Body fetch returned no body, ignoring", message.id);
                continue;
            };

            let raw_body = collect_text(body).await?;
            if processed.is_empty() {
                self.transition(PipelineState::BodyFetched);
                self.transition(PipelineState::Extracting);
            }
            processed.insert(message.id);
            self.extract_one(message.id, &raw_body, &mut report).await;
        }
        handle.await_completion().await?;

        Ok(report)
    }

    // Per-message failures are reported and counted, never propagated
    async fn extract_one(&self, id: MessageId, raw_body: &str, report: &mut RunReport) {
        match self.extractor.extract(raw_body).await {
            Ok(ExtractOutcome::Saved { path, size }) => {
                info!("[{}] Saved {} ({} bytes)", id, path.display(), size);
                report.written += 1;
            }
            Ok(ExtractOutcome::Skipped(reason)) => {
                info!("[{}] Skipped: {}", id, reason);
                report.skipped += 1;
            }
            Err(e) => {
                error!("[{}] Extraction failed: {}", id, e);
                report.failed += 1;
            }
        }
    }
}

async fn fetch_structures(
    session: &mut dyn MailboxSession,
    ids: &[MessageId],
) -> Result<HashMap<MessageId, MimePartDescriptor>, PipelineError> {
    let mut handle = session.fetch(ids, FetchProjection::Structure).await?;
    let mut structures = HashMap::new();

    while let Some(message) = handle.next_message().await {
        if let MessagePayload::Structure(descriptor) = message.payload {
            structures.insert(message.id, descriptor);
        }
    }
    handle.await_completion().await?;

    Ok(structures)
}
