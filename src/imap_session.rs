use crate::config::MailboxConfig;
use crate::error::PipelineError;
use crate::fetch_handle::FetchHandle;
use crate::traits::{
    FetchProjection, FetchedMessage, MailboxConnector, MailboxInfo, MailboxSession, MessageId,
    MessagePayload, MimePartDescriptor, SearchCriterion,
};
use async_imap::Session;
use async_imap::imap_proto::BodyStructure;
use async_imap::types::Fetch;
use async_native_tls::TlsConnector;
use async_trait::async_trait;
use futures::io::{AsyncRead, AsyncWrite};
use futures::{StreamExt, future, stream};
use log::{debug, info, warn};
use std::fmt;
use tokio::net::TcpStream;
use tokio_util::compat::TokioAsyncReadCompatExt;

/// Plain or TLS byte stream underneath the IMAP client.
pub trait ImapTransport: AsyncRead + AsyncWrite + Unpin + Send + fmt::Debug {}

impl<T> ImapTransport for T where T: AsyncRead + AsyncWrite + Unpin + Send + fmt::Debug {}

type ImapSession = Session<Box<dyn ImapTransport>>;

pub struct ImapConnector;

#[async_trait]
impl MailboxConnector for ImapConnector {
    async fn connect(
        &self,
        config: &MailboxConfig,
    ) -> Result<Box<dyn MailboxSession>, PipelineError> {
        let addr = format!("{}:{}", config.host, config.port);
        let tcp_stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| PipelineError::Connection(format!("failed to connect to {}: {}", addr, e)))?;

        let transport: Box<dyn ImapTransport> = if config.use_tls {
            let tls = TlsConnector::new();
            let tls_stream = tls
                .connect(&config.host, tcp_stream.compat())
                .await
                .map_err(|e| PipelineError::Connection(format!("TLS handshake failed: {}", e)))?;
            Box::new(tls_stream)
        } else {
            warn!("Connecting to {} without TLS", addr);
            Box::new(tcp_stream.compat())
        };

        let client = async_imap::Client::new(transport);

        let session = client
            .login(&config.username, &config.password)
            .await
            .map_err(|e| {
                PipelineError::Connection(format!("login failed for {}: {}", config.username, e.0))
            })?;

        Ok(Box::new(ImapMailboxSession {
            session: Some(session),
        }))
    }
}

pub struct ImapMailboxSession {
    session: Option<ImapSession>,
}

impl ImapMailboxSession {
    fn active(&mut self) -> Result<&mut ImapSession, PipelineError> {
        self.session
            .as_mut()
            .ok_or_else(|| PipelineError::Connection("session is already closed".to_string()))
    }
}

#[async_trait]
impl MailboxSession for ImapMailboxSession {
    async fn open_mailbox(
        &mut self,
        name: &str,
        read_only: bool,
    ) -> Result<MailboxInfo, PipelineError> {
        let session = self.active()?;

        // EXAMINE opens the mailbox without touching any flags
        let result = if read_only {
            session.examine(name).await
        } else {
            session.select(name).await
        };
        let mailbox = result
            .map_err(|e| PipelineError::Mailbox(format!("failed to open mailbox {}: {}", name, e)))?;

        Ok(MailboxInfo {
            name: name.to_string(),
            exists: mailbox.exists,
            read_only,
        })
    }

    async fn search(
        &mut self,
        criterion: &SearchCriterion,
    ) -> Result<Vec<MessageId>, PipelineError> {
        let session = self.active()?;

        let search_result = session
            .search(criterion.to_imap_query())
            .await
            .map_err(|e| PipelineError::Search(format!("{} rejected: {}", criterion, e)))?;

        let mut ids: Vec<MessageId> = search_result.into_iter().map(MessageId).collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn fetch<'a>(
        &'a mut self,
        ids: &[MessageId],
        projection: FetchProjection,
    ) -> Result<FetchHandle<'a>, PipelineError> {
        let sequence_set = ids
            .iter()
            .map(|id| id.0.to_string())
            .collect::<Vec<_>>()
            .join(",");

        let session = self.active()?;
        let fetch_stream = session
            .fetch(&sequence_set, projection.as_imap_query())
            .await
            .map_err(|e| PipelineError::Fetch(format!("FETCH {} refused: {}", sequence_set, e)))?;

        let events = fetch_stream
            .filter_map(move |result| {
                future::ready(match result {
                    Ok(fetch) => to_fetched_message(&fetch, projection).map(Ok),
                    Err(e) => Some(Err(PipelineError::Fetch(format!(
                        "error reading fetch response: {}",
                        e
                    )))),
                })
            })
            .boxed();

        Ok(FetchHandle::new(events))
    }

    async fn close(&mut self) {
        match self.session.take() {
            Some(mut session) => match session.logout().await {
                Ok(()) => info!("Logged out"),
                Err(e) => warn!("Logout failed, dropping connection: {}", e),
            },
            None => debug!("Session already closed"),
        }
    }
}

// Untagged FETCH responses without the requested item (e.g. flag updates) are dropped
fn to_fetched_message(fetch: &Fetch, projection: FetchProjection) -> Option<FetchedMessage> {
    let id = MessageId(fetch.message);

    let payload = match projection {
        FetchProjection::Structure => match fetch.bodystructure() {
            Some(structure) => MessagePayload::Structure(describe(structure)),
            None => {
                debug!("{} returned no BODYSTRUCTURE, ignoring", id);
                return None;
            }
        },
        FetchProjection::BodyText => match fetch.text() {
            Some(text) => {
                let chunk: std::io::Result<Vec<u8>> = Ok(text.to_vec());
                MessagePayload::Body(stream::once(future::ready(chunk)).boxed())
            }
            None => {
                debug!("{} returned no BODY[TEXT], ignoring", id);
                return None;
            }
        },
    };

    Some(FetchedMessage { id, payload })
}

fn describe(structure: &BodyStructure<'_>) -> MimePartDescriptor {
    match structure {
        BodyStructure::Basic { common, .. }
        | BodyStructure::Text { common, .. }
        | BodyStructure::Message { common, .. } => {
            MimePartDescriptor::leaf(&common.ty.ty, &common.ty.subtype)
        }
        BodyStructure::Multipart { common, bodies, .. } => MimePartDescriptor::multipart(
            &common.ty.subtype,
            bodies.iter().map(describe).collect(),
        ),
    }
}
