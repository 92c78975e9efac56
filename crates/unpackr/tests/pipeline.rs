use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream;
use unpackr::{
    ChatId, ChatTransport, Config, Error, InputError, MediaKind, MessageRef, OutgoingFile, OwnerId,
    RemoteRef, SessionError, SessionRegistry, Started, StatusSink, Thumbnail, TransferProgress,
    TransportError, Unpacker, UploadDispatcher, UploadOptions, UserSettings, UserStore,
};
use unpackr_fetch::{Fetcher, HttpBody, HttpClient};
use zip::write::SimpleFileOptions;

const OWNER: OwnerId = 42;
const CHAT: ChatId = -100;

#[derive(Debug)]
struct SentFile {
    via: &'static str,
    path: PathBuf,
    kind: MediaKind,
    caption: String,
    thumbnail: Option<PathBuf>,
    thumbnail_present: bool,
}

/// Records sends; fails any file whose name is in `reject`.
struct MockTransport {
    name: &'static str,
    reject: Vec<&'static str>,
    sent: Mutex<Vec<SentFile>>,
    edits: Mutex<Vec<String>>,
}

impl MockTransport {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            reject: Vec::new(),
            sent: Mutex::new(Vec::new()),
            edits: Mutex::new(Vec::new()),
        }
    }

    fn rejecting(mut self, file: &'static str) -> Self {
        self.reject.push(file);
        self
    }
}

impl ChatTransport for MockTransport {
    async fn send_text(&self, chat: ChatId, _text: &str) -> Result<MessageRef, TransportError> {
        Ok(MessageRef { chat, id: 1 })
    }

    async fn edit_text(&self, _message: &MessageRef, text: &str) -> Result<(), TransportError> {
        self.edits.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn delete(&self, _message: &MessageRef) -> Result<(), TransportError> {
        Ok(())
    }

    async fn download(
        &self,
        _remote: &RemoteRef,
        destination: &Path,
        _progress: Option<TransferProgress>,
    ) -> Result<PathBuf, TransportError> {
        std::fs::write(destination, b"\xff\xd8jpeg").map_err(|e| TransportError::DownloadFailed(e.to_string()))?;
        Ok(destination.to_path_buf())
    }

    async fn send_file(
        &self,
        chat: ChatId,
        file: OutgoingFile<'_>,
        progress: Option<TransferProgress>,
    ) -> Result<MessageRef, TransportError> {
        let name = file.path.file_name().unwrap().to_string_lossy().into_owned();
        if self.reject.contains(&name.as_str()) {
            return Err(TransportError::SendFailed("FILE_PARTS_INVALID".into()));
        }
        let size = std::fs::metadata(file.path).unwrap().len();
        if let Some(progress) = progress {
            progress(size, size);
        }
        self.sent.lock().unwrap().push(SentFile {
            via: self.name,
            path: file.path.to_path_buf(),
            kind: file.kind,
            caption: file.caption.to_string(),
            thumbnail: file.thumbnail.map(Path::to_path_buf),
            thumbnail_present: file.thumbnail.is_some_and(Path::exists),
        });
        Ok(MessageRef { chat, id: 2 })
    }
}

#[derive(Default)]
struct MemoryUsers {
    settings: Mutex<HashMap<OwnerId, UserSettings>>,
}

impl UserStore for MemoryUsers {
    async fn settings(&self, owner: OwnerId) -> UserSettings {
        self.settings.lock().unwrap().get(&owner).cloned().unwrap_or_default()
    }

    async fn update(&self, owner: OwnerId, settings: UserSettings) {
        self.settings.lock().unwrap().insert(owner, settings);
    }
}

#[derive(Default)]
struct Lines(Mutex<Vec<String>>);

impl StatusSink for Lines {
    async fn update(&self, text: &str) -> Result<(), TransportError> {
        self.0.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

impl Lines {
    fn last(&self) -> String {
        self.0.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        writer.start_file(*name, SimpleFileOptions::default()).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn config(root: &Path) -> Config {
    Config {
        download_dir: root.join("downloads"),
        progress_interval_ms: 100,
        archiver: "unpackr-test-missing-archiver".into(),
        ..Config::default()
    }
}

fn unpacker(root: &Path, transport: MockTransport) -> Unpacker<MockTransport, MemoryUsers> {
    Unpacker::new(config(root), Arc::new(transport), Arc::new(MemoryUsers::default()))
}

fn fixture(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

#[tokio::test]
async fn zip_job_opens_a_session() {
    let temp = tempfile::tempdir().unwrap();
    let unpacker = unpacker(temp.path(), MockTransport::new("bot"));
    let source = fixture(
        temp.path(),
        "bundle.zip",
        &zip_bytes(&[("b/c.txt", b"world"), ("a.txt", b"hello")]),
    );
    let status = Arc::new(Lines::default());

    let started = unpacker.process(OWNER, &source, Arc::clone(&status)).await.unwrap();

    assert_eq!(started, Started::Active { files: 2 });
    assert!(!source.exists(), "source archive is removed after extraction");
    assert!(status.last().starts_with("Extracted 2 files"), "{}", status.last());

    let rows = unpacker.sessions().view(OWNER).await.unwrap();
    let names: Vec<_> = rows.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["a.txt", "b/c.txt"]);
    assert!(rows.iter().all(|r| r.selected && r.size == 5));
}

#[tokio::test]
async fn oversized_input_leaves_no_directory() {
    let temp = tempfile::tempdir().unwrap();
    let unpacker = Unpacker::new(
        Config {
            free_limit: 10,
            ..config(temp.path())
        },
        Arc::new(MockTransport::new("bot")),
        Arc::new(MemoryUsers::default()),
    );

    let err = unpacker.admit(OWNER, "big.zip", 11).await.unwrap_err();
    assert!(matches!(err, Error::Input(InputError::OversizedInput { size: 11, limit: 10 })));
    let err = unpacker.admit(OWNER, "photo.jpg", 1).await.unwrap_err();
    assert!(matches!(err, Error::Input(InputError::NotAnArchive { .. })));
    assert!(!unpacker.config().download_dir.exists());

    assert_eq!(
        unpacker.admit(OWNER, "Backup.TAR.GZ", 10).await.unwrap(),
        unpackr::ArchiveKind::TarGz
    );
}

#[tokio::test]
async fn premium_owners_get_the_larger_limit() {
    let temp = tempfile::tempdir().unwrap();
    let users = Arc::new(MemoryUsers::default());
    users
        .update(
            OWNER,
            UserSettings {
                premium: true,
                ..UserSettings::default()
            },
        )
        .await;
    let unpacker = Unpacker::new(
        Config {
            free_limit: 10,
            premium_limit: 100,
            ..config(temp.path())
        },
        Arc::new(MockTransport::new("bot")),
        users,
    );

    assert!(unpacker.admit(OWNER, "big.zip", 50).await.is_ok());
    assert!(unpacker.admit(OWNER + 1, "big.zip", 50).await.is_err());
}

#[tokio::test]
async fn second_job_while_busy_is_rejected() {
    let temp = tempfile::tempdir().unwrap();
    let unpacker = unpacker(temp.path(), MockTransport::new("bot"));
    let source = fixture(temp.path(), "one.zip", &zip_bytes(&[("a.txt", b"a")]));

    unpacker.sessions().reserve(OWNER).await.unwrap();
    let err = unpacker
        .process(OWNER, &source, Arc::new(Lines::default()))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Session(SessionError::Busy)));
    assert!(err.is_transient());
    assert!(source.exists());
}

#[tokio::test]
async fn corrupt_archive_fails_cleanly() {
    let temp = tempfile::tempdir().unwrap();
    let unpacker = unpacker(temp.path(), MockTransport::new("bot"));
    let source = fixture(temp.path(), "broken.zip", b"PK\x03\x04 this is not really a zip");
    assert_eq!(unpackr_archive::manifest(&source), None);

    let status = Arc::new(Lines::default());
    let err = unpacker.process(OWNER, &source, Arc::clone(&status)).await.unwrap_err();

    assert!(matches!(&err, Error::Archive(e) if e.is_corrupt()), "{err:?}");
    assert!(status.last().contains("corrupted"), "{}", status.last());
    let owner_dir = unpacker.config().download_dir.join(OWNER.to_string());
    let leftovers = std::fs::read_dir(&owner_dir).map(|d| d.count()).unwrap_or(0);
    assert_eq!(leftovers, 0);

    // The reservation was released.
    unpacker.sessions().reserve(OWNER).await.unwrap();
}

#[tokio::test]
async fn empty_archive_is_an_input_error() {
    let temp = tempfile::tempdir().unwrap();
    let unpacker = unpacker(temp.path(), MockTransport::new("bot"));
    let source = fixture(temp.path(), "empty.zip", &zip_bytes(&[]));

    let err = unpacker
        .process(OWNER, &source, Arc::new(Lines::default()))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Input(InputError::EmptyArchive)));
    assert!(!unpacker.sessions().is_active(OWNER).await);
    unpacker.sessions().reserve(OWNER).await.unwrap();
}

#[tokio::test]
async fn upload_isolates_failures_and_purges() {
    let temp = tempfile::tempdir().unwrap();
    let unpacker = unpacker(temp.path(), MockTransport::new("bot").rejecting("b.txt"));
    let source = fixture(
        temp.path(),
        "bundle.zip",
        &zip_bytes(&[("a.txt", b"a"), ("b.txt", b"b"), ("clip.mp4", b"c")]),
    );
    unpacker.process(OWNER, &source, Arc::new(Lines::default())).await.unwrap();
    assert_eq!(unpacker.sessions().view(OWNER).await.unwrap().len(), 3);

    let summary = unpacker.upload_selection(OWNER, CHAT, None).await.unwrap();

    assert_eq!(summary.sent.len(), 2);
    assert_eq!(summary.failed.len(), 1);
    assert!(summary.failed[0].0.ends_with("b.txt"));
    assert!(matches!(summary.failed[0].1, TransportError::UploadFailed { .. }));
    assert!(!summary.is_complete());

    let owner_dir = unpacker.config().download_dir.join(OWNER.to_string());
    assert_eq!(std::fs::read_dir(&owner_dir).unwrap().count(), 0);

    let sent = unpacker.dispatcher().primary().sent.lock().unwrap();
    assert_eq!(sent[0].caption, "a.txt");
    assert_eq!(sent[0].kind, MediaKind::Document);
    assert_eq!(sent[1].kind, MediaKind::Video);
    drop(sent);

    let again = unpacker.upload_selection(OWNER, CHAT, None).await.unwrap_err();
    assert!(matches!(again, Error::Session(SessionError::SessionExpired)));
}

#[tokio::test]
async fn empty_selection_keeps_the_session() {
    let temp = tempfile::tempdir().unwrap();
    let unpacker = unpacker(temp.path(), MockTransport::new("bot"));
    let source = fixture(temp.path(), "bundle.zip", &zip_bytes(&[("a.txt", b"a")]));
    unpacker.process(OWNER, &source, Arc::new(Lines::default())).await.unwrap();

    unpacker.sessions().select_none(OWNER).await.unwrap();
    let err = unpacker.upload_selection(OWNER, CHAT, None).await.unwrap_err();

    assert!(matches!(err, Error::Session(SessionError::EmptySelection)));
    assert!(unpacker.sessions().is_active(OWNER).await);
}

#[tokio::test]
async fn remote_thumbnail_is_materialized_then_removed() {
    let temp = tempfile::tempdir().unwrap();
    let file = fixture(temp.path(), "movie.mkv", b"frames");
    let dispatcher = UploadDispatcher::new(Arc::new(MockTransport::new("bot")), 1024, temp.path().join("scratch"));
    let options = UploadOptions::default()
        .caption("movie")
        .thumbnail(Thumbnail::Remote(RemoteRef("AAQC-thumb".into())));

    dispatcher.upload(&file, CHAT, &options, None).await.unwrap();

    let sent = dispatcher.primary().sent.lock().unwrap();
    let thumbnail = sent[0].thumbnail.clone().expect("thumbnail passed to the transport");
    assert!(sent[0].thumbnail_present);
    assert!(!thumbnail.exists(), "scratch thumbnail is deleted after the send");
    assert_eq!(sent[0].kind, MediaKind::Video);
}

#[tokio::test]
async fn large_files_need_the_elevated_transport() {
    let temp = tempfile::tempdir().unwrap();
    let small = fixture(temp.path(), "small.bin", &[0; 4]);
    let medium = fixture(temp.path(), "medium.bin", &[0; 64]);
    let huge = fixture(temp.path(), "huge.bin", &[0; 512]);

    let primary_only = UploadDispatcher::new(Arc::new(MockTransport::new("bot")), 16, temp.path());
    let err = primary_only
        .upload(&medium, CHAT, &UploadOptions::default(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::NoCapableTransport { size: 64, ceiling: 16 }));

    let elevated = Arc::new(MockTransport::new("user"));
    let dispatcher = UploadDispatcher::new(Arc::new(MockTransport::new("bot")), 16, temp.path())
        .elevated(Arc::clone(&elevated), 128);
    dispatcher.upload(&small, CHAT, &UploadOptions::default(), None).await.unwrap();
    dispatcher.upload(&medium, CHAT, &UploadOptions::default(), None).await.unwrap();
    let err = dispatcher
        .upload(&huge, CHAT, &UploadOptions::default(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::NoCapableTransport { size: 512, ceiling: 128 }));

    assert_eq!(dispatcher.primary().sent.lock().unwrap()[0].via, "bot");
    let via_elevated = elevated.sent.lock().unwrap();
    assert_eq!(via_elevated.len(), 1);
    assert_eq!(via_elevated[0].via, "user");
    assert!(via_elevated[0].path.ends_with("medium.bin"));
}

#[tokio::test]
async fn upload_progress_ends_with_terminal_text() {
    let temp = tempfile::tempdir().unwrap();
    let file = fixture(temp.path(), "notes.txt", b"some notes");
    let transport = Arc::new(MockTransport::new("bot"));
    let dispatcher = UploadDispatcher::new(Arc::clone(&transport), 1024, temp.path())
        .progress_interval(Duration::from_millis(10));
    let status = MessageRef { chat: CHAT, id: 9 };

    dispatcher
        .upload(&file, CHAT, &UploadOptions::default(), Some(&status))
        .await
        .unwrap();

    let edits = transport.edits.lock().unwrap();
    assert_eq!(edits.last().unwrap(), "Uploaded notes.txt (10.00 B)");
}

#[tokio::test]
async fn concurrent_toggles_through_one_registry_all_apply() {
    let temp = tempfile::tempdir().unwrap();
    let names: Vec<String> = (0..8).map(|i| format!("f{i}.txt")).collect();
    for name in &names {
        fixture(temp.path(), name, b"x");
    }
    let files = unpackr::ExtractedFileSet::scan(temp.path()).unwrap();

    let registry = Arc::new(SessionRegistry::new());
    registry.start(OWNER, files.clone()).await;
    registry.select_none(OWNER).await.unwrap();

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.toggle(OWNER, i).await })
        })
        .collect();
    for task in tasks {
        assert!(task.await.unwrap().unwrap());
    }
    let commit = registry.commit(OWNER).await.unwrap();
    assert_eq!(commit.files.len(), 8);

    // Two registries for the same owner do not see each other's toggles.
    let left = Arc::new(SessionRegistry::new());
    let right = Arc::new(SessionRegistry::new());
    for registry in [&left, &right] {
        registry.start(OWNER, files.clone()).await;
        registry.select_none(OWNER).await.unwrap();
    }
    for i in 0..8 {
        let registry = if i % 2 == 0 { &left } else { &right };
        registry.toggle(OWNER, i).await.unwrap();
    }
    assert_eq!(left.commit(OWNER).await.unwrap().files.len(), 4);
    assert_eq!(right.commit(OWNER).await.unwrap().files.len(), 4);
}

#[tokio::test]
async fn sweeper_reclaims_abandoned_sessions() {
    let temp = tempfile::tempdir().unwrap();
    let destination = temp.path().join("job");
    std::fs::create_dir(&destination).unwrap();
    fixture(&destination, "a.txt", b"a");

    let registry = Arc::new(SessionRegistry::new());
    registry
        .start(OWNER, unpackr::ExtractedFileSet::scan(&destination).unwrap())
        .await;
    let sweeper = registry.spawn_sweeper(Duration::from_millis(10), Duration::ZERO);

    tokio::time::sleep(Duration::from_millis(100)).await;
    sweeper.abort();

    assert!(!registry.is_active(OWNER).await);
    assert!(!destination.exists());
}

struct OneShotClient(&'static [u8]);

impl HttpClient for OneShotClient {
    async fn get(&self, _url: &str) -> unpackr_fetch::Result<HttpBody> {
        Ok(HttpBody {
            content_length: Some(self.0.len() as u64),
            stream: Box::pin(stream::iter(vec![Ok(Bytes::from_static(self.0))])),
        })
    }
}

#[tokio::test]
async fn fetched_archive_flows_into_extraction() {
    let temp = tempfile::tempdir().unwrap();
    let unpacker = unpacker(temp.path(), MockTransport::new("bot"));
    let archive: &'static [u8] = Box::leak(zip_bytes(&[("readme.md", b"# hi")]).into_boxed_slice());
    let fetcher = Fetcher::new(OneShotClient(archive));
    let status = Arc::new(Lines::default());

    let path = unpacker
        .fetch_url(&fetcher, OWNER, "https://files.example/pkg/release.zip?token=abc", Arc::clone(&status))
        .await
        .unwrap();
    assert!(path.ends_with("release.zip"));
    assert_eq!(status.last(), "Downloaded release.zip");

    let kind = unpacker.admit(OWNER, "release.zip", archive.len() as u64).await.unwrap();
    assert_eq!(kind, unpackr::ArchiveKind::Zip);
    let started = unpacker.process(OWNER, &path, status).await.unwrap();
    assert_eq!(started, Started::Active { files: 1 });
    assert!(!path.parent().unwrap().exists(), "per-job download directory is reclaimed");
}

/// Sends one chunk, then drops the connection.
struct DroppingClient;

impl HttpClient for DroppingClient {
    async fn get(&self, _url: &str) -> unpackr_fetch::Result<HttpBody> {
        Ok(HttpBody {
            content_length: None,
            stream: Box::pin(stream::iter(vec![
                Ok(Bytes::from_static(b"half")),
                Err(unpackr_fetch::FetchError::Network("connection reset".into())),
            ])),
        })
    }
}

#[tokio::test]
async fn repeated_fetches_never_share_a_path() {
    let temp = tempfile::tempdir().unwrap();
    let unpacker = unpacker(temp.path(), MockTransport::new("bot"));
    let url = "https://files.example/pkg/release.zip";

    let first = unpacker
        .fetch_url(&Fetcher::new(OneShotClient(b"first body")), OWNER, url, Arc::new(Lines::default()))
        .await
        .unwrap();
    let second = unpacker
        .fetch_url(&Fetcher::new(OneShotClient(b"second body")), OWNER, url, Arc::new(Lines::default()))
        .await
        .unwrap();
    assert_ne!(first, second);
    assert_eq!(std::fs::read(&first).unwrap(), b"first body");
    assert_eq!(std::fs::read(&second).unwrap(), b"second body");

    let status = Arc::new(Lines::default());
    let err = unpacker
        .fetch_url(&Fetcher::new(DroppingClient), OWNER, url, Arc::clone(&status))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Fetch(_)), "got {err:?}");
    assert!(status.last().starts_with("Download failed"), "{}", status.last());
    assert_eq!(std::fs::read(&first).unwrap(), b"first body");
    assert_eq!(std::fs::read(&second).unwrap(), b"second body");

    let incoming = first.parent().unwrap().parent().unwrap();
    assert_eq!(std::fs::read_dir(incoming).unwrap().count(), 2, "failed job leaves no directory");
}

#[tokio::test]
async fn banned_owner_is_refused_before_anything() {
    let temp = tempfile::tempdir().unwrap();
    let users = Arc::new(MemoryUsers::default());
    users
        .update(
            OWNER,
            UserSettings {
                banned: true,
                premium: true,
                ..UserSettings::default()
            },
        )
        .await;
    let unpacker = Unpacker::new(config(temp.path()), Arc::new(MockTransport::new("bot")), users);

    let err = unpacker.admit(OWNER, "small.zip", 1).await.unwrap_err();
    assert!(matches!(err, Error::Input(InputError::Banned)), "got {err:?}");
    assert_eq!(err.user_message(), "You are not allowed to use this bot.");
    assert!(!unpacker.config().download_dir.exists());

    assert!(unpacker.admit(OWNER + 1, "small.zip", 1).await.is_ok());
}

#[tokio::test]
async fn rename_on_receive_follows_the_owner_preference() {
    let temp = tempfile::tempdir().unwrap();
    let users = Arc::new(MemoryUsers::default());
    users
        .update(
            OWNER,
            UserSettings {
                rename_on_receive: true,
                ..UserSettings::default()
            },
        )
        .await;
    let unpacker = Unpacker::new(config(temp.path()), Arc::new(MockTransport::new("bot")), users);

    let received = fixture(temp.path(), "upload_17.tar.gz", b"x");
    let renamed = unpacker.receive_as(OWNER, &received, Some("holiday")).await.unwrap();
    assert_eq!(renamed, temp.path().join("holiday.tar.gz"));
    assert!(renamed.exists());

    let other = fixture(temp.path(), "upload_18.zip", b"x");
    let kept = unpacker.receive_as(OWNER + 1, &other, Some("ignored")).await.unwrap();
    assert_eq!(kept, other);
    assert!(other.exists());

    let unchanged = unpacker.receive_as(OWNER, &renamed, None).await.unwrap();
    assert_eq!(unchanged, renamed);
}
