use crate::config::MailboxConfig;
use crate::error::PipelineError;
use crate::fetch_handle::FetchHandle;
use async_trait::async_trait;
use chrono::NaiveDate;
use futures::stream::BoxStream;
use std::fmt;
use std::io;
use std::path::Path;

/// Sequence number of a message, only meaningful inside the session that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(pub u32);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchCriterion {
    pub sender: String,
    pub since: Option<NaiveDate>,
}

impl SearchCriterion {
    pub fn from_sender(sender: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            since: None,
        }
    }

    pub fn since(mut self, date: Option<NaiveDate>) -> Self {
        self.since = date;
        self
    }

    /// Renders the criterion as an IMAP SEARCH key list.
    pub fn to_imap_query(&self) -> String {
        let sender = self.sender.replace('\\', "\\\\").replace('"', "\\\"");
        let mut query = format!("FROM \"{}\"", sender);
        if let Some(date) = self.since {
            query.push_str(&format!(" SINCE {}", date.format("%d-%b-%Y")));
        }
        query
    }
}

impl fmt::Display for SearchCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_imap_query())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxInfo {
    pub name: String,
    pub exists: u32,
    pub read_only: bool,
}

/// One node of a message's BODYSTRUCTURE. Type and subtype are lowercase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimePartDescriptor {
    pub media_type: String,
    pub subtype: String,
    pub children: Vec<MimePartDescriptor>,
}

impl MimePartDescriptor {
    pub fn leaf(media_type: &str, subtype: &str) -> Self {
        Self {
            media_type: media_type.to_ascii_lowercase(),
            subtype: subtype.to_ascii_lowercase(),
            children: Vec::new(),
        }
    }

    pub fn multipart(subtype: &str, children: Vec<MimePartDescriptor>) -> Self {
        Self {
            media_type: "multipart".to_string(),
            subtype: subtype.to_ascii_lowercase(),
            children,
        }
    }
}

/// Which data item a fetch asks the server for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchProjection {
    Structure,
    BodyText,
}

impl FetchProjection {
    pub fn as_imap_query(&self) -> &'static str {
        match self {
            // PEEK keeps the \Seen flag untouched
            FetchProjection::Structure => "BODYSTRUCTURE",
            FetchProjection::BodyText => "BODY.PEEK[TEXT]",
        }
    }
}

/// Incremental body content, chunks in arrival order.
pub type BodyStream = BoxStream<'static, io::Result<Vec<u8>>>;

pub enum MessagePayload {
    Structure(MimePartDescriptor),
    Body(BodyStream),
}

pub struct FetchedMessage {
    pub id: MessageId,
    pub payload: MessagePayload,
}

// Factory trait, so the pipeline can run against a fake mailbox
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MailboxConnector: Send + Sync {
    /// Connects and authenticates, returning a ready session
    async fn connect(
        &self,
        config: &MailboxConfig,
    ) -> Result<Box<dyn MailboxSession>, PipelineError>;
}

#[async_trait]
pub trait MailboxSession: Send {
    async fn open_mailbox(
        &mut self,
        name: &str,
        read_only: bool,
    ) -> Result<MailboxInfo, PipelineError>;

    /// Returns matching ids in ascending order, empty when nothing matches
    async fn search(
        &mut self,
        criterion: &SearchCriterion,
    ) -> Result<Vec<MessageId>, PipelineError>;

    async fn fetch<'a>(
        &'a mut self,
        ids: &[MessageId],
        projection: FetchProjection,
    ) -> Result<FetchHandle<'a>, PipelineError>;

    /// Logs out. Safe to call more than once; failures are only logged.
    async fn close(&mut self);
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    /// Writes the whole payload or leaves nothing behind
    async fn save(&self, path: &Path, contents: &[u8]) -> io::Result<()>;
}
