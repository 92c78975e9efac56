//! Capabilities the core consumes from the chat layer.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::TransportError;
use crate::session::OwnerId;

pub type ChatId = i64;

/// Handle to a sent message, used to edit or delete it later.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat: ChatId,
    pub id: i64,
}

/// Opaque reference to a file stored by the chat service.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RemoteRef(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    Document,
    Video,
    Audio,
}

/// `(bytes_done, bytes_total)`; the total is 0 when unknown.
pub type TransferProgress = Arc<dyn Fn(u64, u64) + Send + Sync>;

pub struct OutgoingFile<'a> {
    pub path: &'a Path,
    pub kind: MediaKind,
    pub caption: &'a str,
    pub thumbnail: Option<&'a Path>,
    pub spoiler: bool,
}

pub trait ChatTransport: Send + Sync + 'static {
    fn send_text(
        &self,
        chat: ChatId,
        text: &str,
    ) -> impl Future<Output = Result<MessageRef, TransportError>> + Send;

    /// Implementations should report "not modified" as success.
    fn edit_text(
        &self,
        message: &MessageRef,
        text: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn delete(&self, message: &MessageRef) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn download(
        &self,
        remote: &RemoteRef,
        destination: &Path,
        progress: Option<TransferProgress>,
    ) -> impl Future<Output = Result<PathBuf, TransportError>> + Send;

    fn send_file(
        &self,
        chat: ChatId,
        file: OutgoingFile<'_>,
        progress: Option<TransferProgress>,
    ) -> impl Future<Output = Result<MessageRef, TransportError>> + Send;
}

/// Per-owner preferences. The core reads these; it never persists them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserSettings {
    pub rename_on_receive: bool,
    pub upload_as_document: bool,
    pub spoiler: bool,
    pub thumbnail: Option<RemoteRef>,
    pub premium: bool,
    pub banned: bool,
}

pub trait UserStore: Send + Sync + 'static {
    fn settings(&self, owner: OwnerId) -> impl Future<Output = UserSettings> + Send;

    fn update(&self, owner: OwnerId, settings: UserSettings) -> impl Future<Output = ()> + Send;
}

/// Where progress text goes. A chat message in production, a terminal line in the CLI.
pub trait StatusSink: Send + Sync + 'static {
    fn update(&self, text: &str) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// Edits one chat message in place.
pub struct MessageStatus<T> {
    transport: Arc<T>,
    message: MessageRef,
}

impl<T: ChatTransport> MessageStatus<T> {
    pub fn new(transport: Arc<T>, message: MessageRef) -> Self {
        Self { transport, message }
    }

    pub fn message(&self) -> &MessageRef {
        &self.message
    }
}

impl<T: ChatTransport> StatusSink for MessageStatus<T> {
    async fn update(&self, text: &str) -> Result<(), TransportError> {
        self.transport.edit_text(&self.message, text).await
    }
}
