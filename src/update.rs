use crate::error::BoxError;
use crate::resolver::ResolvedEnvironment;
use crate::version::{read_json_string, GameVersion, LocalVersion};
use futures_util::FutureExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const REMOTE_VERSION_URL: &str =
    "https://cbjq-client.xoyocdn.com/games/cbjq/SyncEntrys/cbjq_SyncEntry.json";
const REMOTE_VERSION_FIELD: &str = "GameVersion";

/// Fetches the published game version. Purely advisory: every failure ends up
/// as "no update known".
#[derive(Debug, Clone)]
pub struct UpdateChecker {
    pub url: String,
    client: reqwest::Client,
}

impl UpdateChecker {
    pub fn new() -> Self {
        Self::with_url(REMOTE_VERSION_URL)
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        // The CDN's certificate chain is not always valid; the payload is untrusted anyway
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .user_agent(concat!("snowbreak-box/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|e| {
                warn!("Falling back to default HTTP client: {}", e);
                reqwest::Client::new()
            });

        Self {
            url: url.into(),
            client,
        }
    }

    /// Remote version, or `None` on any network or format problem.
    pub async fn fetch_remote_version(&self) -> Option<GameVersion> {
        match self.try_fetch().await {
            Ok(version) => {
                debug!("Remote game version {}", version);
                Some(version)
            }
            Err(e) => {
                warn!("{}", e);
                None
            }
        }
    }

    async fn try_fetch(&self) -> Result<GameVersion, BoxError> {
        let body = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| BoxError::RemoteCheckFailed(e.to_string()))?
            .text()
            .await
            .map_err(|e| BoxError::RemoteCheckFailed(e.to_string()))?;

        let raw = read_json_string(&body, REMOTE_VERSION_FIELD).ok_or_else(|| {
            BoxError::RemoteCheckFailed(format!("no {REMOTE_VERSION_FIELD} field in response"))
        })?;

        raw.parse::<GameVersion>().map_err(BoxError::RemoteCheckFailed)
    }

    /// Whether a newer version than the installed one is published.
    /// Installs without a known local version never report an update.
    pub async fn check(&self, env: &ResolvedEnvironment) -> bool {
        let Some(local) = env.local_version.clone() else {
            return false;
        };
        let remote = self.fetch_remote_version().await;
        has_update(&local, remote.as_ref())
    }
}

impl Default for UpdateChecker {
    fn default() -> Self {
        Self::new()
    }
}

pub fn has_update(local: &LocalVersion, remote: Option<&GameVersion>) -> bool {
    remote.map(|remote| local.is_older_than(remote)).unwrap_or(false)
}

/// The single background version check of a session.
///
/// Read it with [`RemoteVersionProbe::poll`] (never blocks) or
/// [`RemoteVersionProbe::wait`]. Once a result has been observed it is cached,
/// and further reads return the same answer without touching the network.
#[derive(Debug, Default)]
pub enum RemoteVersionProbe {
    #[default]
    NotStarted,
    Pending(JoinHandle<bool>),
    Resolved(bool),
}

impl RemoteVersionProbe {
    /// Starts the check on the current runtime. No local version means no request.
    pub fn start(checker: &UpdateChecker, env: &ResolvedEnvironment) -> Self {
        if env.local_version.is_none() {
            debug!("Skipping update check, local version unknown");
            return RemoteVersionProbe::Resolved(false);
        }

        let checker = checker.clone();
        let env = env.clone();
        RemoteVersionProbe::Pending(tokio::spawn(async move { checker.check(&env).await }))
    }

    /// Result if already available.
    pub fn poll(&mut self) -> Option<bool> {
        match self {
            RemoteVersionProbe::NotStarted => None,
            RemoteVersionProbe::Resolved(update) => Some(*update),
            RemoteVersionProbe::Pending(handle) => {
                if !handle.is_finished() {
                    return None;
                }
                let update = handle.now_or_never().map(settle).unwrap_or(false);
                *self = RemoteVersionProbe::Resolved(update);
                Some(update)
            }
        }
    }

    /// Waits for the result; a probe that was never started reports no update.
    pub async fn wait(&mut self) -> bool {
        let update = match std::mem::take(self) {
            RemoteVersionProbe::NotStarted => false,
            RemoteVersionProbe::Resolved(update) => update,
            RemoteVersionProbe::Pending(handle) => settle(handle.await),
        };
        *self = RemoteVersionProbe::Resolved(update);
        if update {
            info!("A game update is available");
        }
        update
    }
}

fn settle(joined: Result<bool, tokio::task::JoinError>) -> bool {
    joined.unwrap_or_else(|e| {
        warn!("Update check task failed: {}", e);
        false
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launcher::{LauncherType, LoginChannel};
    use crate::probe::{SaveLayout, SaveSource};
    use std::path::PathBuf;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn env(local: Option<&str>) -> ResolvedEnvironment {
        ResolvedEnvironment {
            launcher_type: LauncherType::Seasun,
            launcher_path: PathBuf::from("/l/launcher.exe"),
            game_root: PathBuf::from("/g"),
            save_dir: PathBuf::from("/g/game/Saved"),
            layout: SaveLayout::Standard,
            save_source: SaveSource::GameSubfolder,
            local_version: local.and_then(LocalVersion::parse),
            save_path_is_canonical: true,
            default_channel: LoginChannel::Jinshan,
            update_available: false,
        }
    }

    /// Serves `body` once over plain HTTP and returns the URL.
    async fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
        });
        format!("http://{addr}/cbjq_SyncEntry.json")
    }

    #[test]
    fn update_comparison() {
        let local = LocalVersion::parse("1.9.9").unwrap();
        assert!(has_update(&local, Some(&"1.10.0".parse().unwrap())));
        assert!(!has_update(&local, Some(&"1.9.9.0".parse().unwrap())));
        assert!(!has_update(&local, None));
        assert!(has_update(&LocalVersion::PendingUpdate, Some(&"1.0".parse().unwrap())));
    }

    #[tokio::test]
    async fn fetches_version_from_document() {
        let url = serve_once("200 OK", r#"{"GameVersion": "2.1.0", "Notice": "maintenance"}"#).await;
        let checker = UpdateChecker::with_url(url);
        assert_eq!(checker.fetch_remote_version().await, "2.1.0".parse().ok());
    }

    #[tokio::test]
    async fn malformed_document_means_no_update() {
        let url = serve_once("200 OK", r#"{"GameVersion": 2.1, "#).await;
        let checker = UpdateChecker::with_url(url);
        assert!(!checker.check(&env(Some("1.0"))).await);
    }

    #[tokio::test]
    async fn http_error_means_no_update() {
        let url = serve_once("503 Service Unavailable", r#"{"GameVersion": "9.9"}"#).await;
        let checker = UpdateChecker::with_url(url);
        assert!(!checker.check(&env(Some("1.0"))).await);
    }

    #[tokio::test]
    async fn probe_reports_newer_remote_once() {
        let url = serve_once("200 OK", r#"{"GameVersion":"1.10.0"}"#).await;
        let checker = UpdateChecker::with_url(url);

        let mut probe = RemoteVersionProbe::start(&checker, &env(Some("1.9.9")));
        assert!(probe.wait().await);
        // Second read comes from the cache; the server only answers once
        assert!(probe.wait().await);
        assert_eq!(probe.poll(), Some(true));
    }

    #[tokio::test]
    async fn unknown_local_version_skips_the_request() {
        // Nothing listens here; a request would fail, but none is made
        let checker = UpdateChecker::with_url("http://127.0.0.1:9/unused");
        let mut probe = RemoteVersionProbe::start(&checker, &env(None));
        assert!(matches!(probe, RemoteVersionProbe::Resolved(false)));
        assert_eq!(probe.poll(), Some(false));
    }

    #[tokio::test]
    async fn never_started_probe_reports_nothing() {
        let mut probe = RemoteVersionProbe::default();
        assert_eq!(probe.poll(), None);
        assert!(!probe.wait().await);
    }
}
