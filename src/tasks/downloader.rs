use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::StreamExt;
use reqwest::header::WWW_AUTHENTICATE;
use reqwest::StatusCode;
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;

use crate::errors::{Result, UpdaterError};
use crate::models::{CredentialChallenge, Credentials};
use crate::services::view::CredentialProvider;
use crate::tasks::{CancellableTask, LongRunningTask, TaskResult, TaskStatus};
use crate::utils::crypto::verify_file_hash;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DownloadControl {
    Running,
    Cancelled,
}

/// Thread-safe cancel switch for one download. Cancelling is sticky: a
/// download started after `cancel` returns `Cancelled` immediately.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    control: Arc<watch::Sender<DownloadControl>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (control, _) = watch::channel(DownloadControl::Running);
        Self {
            control: Arc::new(control),
        }
    }

    pub fn cancel(&self) {
        self.control.send_replace(DownloadControl::Cancelled);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.control.borrow() == DownloadControl::Cancelled
    }

    fn subscribe(&self) -> watch::Receiver<DownloadControl> {
        self.control.subscribe()
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// What to fetch, where to put it and how to check it.
#[derive(Clone)]
pub struct DownloadSource {
    pub url: String,
    pub destination: PathBuf,
    pub expected_hash: Option<String>,
    pub credentials: Option<Arc<dyn CredentialProvider>>,
}

impl std::fmt::Debug for DownloadSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadSource")
            .field("url", &self.url)
            .field("destination", &self.destination)
            .field("expected_hash", &self.expected_hash)
            .field("credentials", &self.credentials.is_some())
            .finish()
    }
}

pub struct FileDownloader {
    source: DownloadSource,
    status: Arc<TaskStatus>,
    cancel: CancelHandle,
}

impl FileDownloader {
    pub fn new(source: DownloadSource) -> Self {
        Self {
            source,
            status: Arc::new(TaskStatus::new("download")),
            cancel: CancelHandle::new(),
        }
    }

    pub fn destination(&self) -> &Path {
        &self.source.destination
    }

    fn execute(&mut self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(UpdaterError::Cancelled);
        }

        tracing::info!(
            "downloading {} to {}",
            self.source.url,
            self.source.destination.display()
        );
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let control = self.cancel.subscribe();
        runtime.block_on(transfer(&self.source, &self.status, control))?;

        match self.source.expected_hash.as_deref().map(str::trim) {
            Some(expected) if !expected.is_empty() => {
                verify_file_hash(&self.source.destination, expected)?;
                tracing::info!("verified {}", self.source.destination.display());
            }
            _ => tracing::warn!(
                "no hash supplied for {}, skipping verification",
                self.source.url
            ),
        }
        Ok(())
    }
}

impl LongRunningTask for FileDownloader {
    fn status(&self) -> Arc<TaskStatus> {
        Arc::clone(&self.status)
    }

    fn start(&mut self) -> TaskResult {
        let status = Arc::clone(&self.status);
        status.run_once(|| self.execute())
    }
}

impl CancellableTask for FileDownloader {
    fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }
}

/// Resolves once the control channel reports `Cancelled`. Never resolves if
/// the sender goes away while still running.
async fn cancelled(control: &mut watch::Receiver<DownloadControl>) {
    loop {
        if *control.borrow_and_update() == DownloadControl::Cancelled {
            return;
        }
        if control.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

async fn transfer(
    source: &DownloadSource,
    status: &TaskStatus,
    mut control: watch::Receiver<DownloadControl>,
) -> Result<()> {
    let client = reqwest::Client::builder().build()?;
    let mut credentials: Option<Credentials> = None;
    let mut attempt = 0u32;

    let response = loop {
        let mut request = client.get(&source.url);
        if let Some(credentials) = credentials.as_ref() {
            request = request.basic_auth(&credentials.username, Some(&credentials.password));
        }

        let response = tokio::select! {
            response = request.send() => response?,
            _ = cancelled(&mut control) => return Err(UpdaterError::Cancelled),
        };

        if response.status() != StatusCode::UNAUTHORIZED {
            break response;
        }

        attempt += 1;
        let challenge = CredentialChallenge {
            url: source.url.clone(),
            realm: parse_realm(response.headers().get(WWW_AUTHENTICATE)),
            attempt,
        };
        // the provider may block on the foreground; nothing else runs on this runtime
        let supplied = source
            .credentials
            .as_ref()
            .and_then(|provider| provider.credentials(&challenge));
        if *control.borrow() == DownloadControl::Cancelled {
            return Err(UpdaterError::Cancelled);
        }
        match supplied {
            Some(next) => {
                tracing::info!("retrying {} with supplied credentials", source.url);
                credentials = Some(next);
            }
            None => {
                return Err(UpdaterError::Auth(format!(
                    "credentials declined for {}",
                    source.url
                )))
            }
        }
    };

    let status_code = response.status();
    if !status_code.is_success() {
        return Err(UpdaterError::Http(format!("{} -> HTTP {}", source.url, status_code)));
    }

    status.set_total(response.content_length().unwrap_or(0));
    status.set_progress(0);

    if let Some(parent) = source.destination.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::File::create(&source.destination).await?;
    let mut stream = response.bytes_stream();

    loop {
        tokio::select! {
            _ = cancelled(&mut control) => {
                file.flush().await?;
                return Err(UpdaterError::Cancelled);
            }
            next = stream.next() => {
                let Some(next) = next else { break; };
                let bytes = next?;
                file.write_all(&bytes).await?;
                status.add_progress(bytes.len() as u64);
            }
        }
    }

    file.flush().await?;
    file.sync_all().await?;
    Ok(())
}

fn parse_realm(header: Option<&reqwest::header::HeaderValue>) -> Option<String> {
    let value = header?.to_str().ok()?;
    let start = value.find("realm=")? + "realm=".len();
    let rest = value[start..].trim_start();
    let realm = match rest.strip_prefix('"') {
        Some(quoted) => quoted.split('"').next()?,
        None => rest.split(',').next()?.trim(),
    };
    if realm.is_empty() {
        None
    } else {
        Some(realm.to_string())
    }
}
