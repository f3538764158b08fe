//! End-to-end reconciliation through the cached repository.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use nimbus_artifact_agent::repository::{
    ArtifactRepository, CachedRepository, CachedRepositoryConfig,
};
use nimbus_artifact_agent::sync::{
    ArtifactFetcher, AtomicInstaller, FetchError, HttpFetcher, HttpFetcherConfig, LocalFetcher,
    ReconcilerConfig,
};
use nimbus_artifact_agent::SyncErrorKind;
use nimbus_coordination::{ArtifactKind, MemoryStore, StoreLayout};
use nimbus_id::JobId;
use nimbus_testing::{
    artifact_contents, init_tracing, job, publish_assignment, retract_assignment,
    write_leader_artifacts,
};
use tempfile::TempDir;
use tokio::io::AsyncReadExt;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Cluster {
    _temp: TempDir,
    leader: PathBuf,
    cache: PathBuf,
    store: Arc<MemoryStore>,
    layout: StoreLayout,
    repo: Arc<CachedRepository>,
}

impl Cluster {
    fn new(interval: Duration) -> Self {
        let temp = TempDir::new().unwrap();
        let leader = temp.path().join("leader");
        let cache = temp.path().join("local").join("nimbus");
        let store = Arc::new(MemoryStore::new());
        let layout = StoreLayout::default();

        let repo = CachedRepository::new(
            CachedRepositoryConfig {
                root: cache.clone(),
                layout: layout.clone(),
                reconciler: ReconcilerConfig {
                    interval,
                    max_concurrent_installs: 4,
                },
            },
            store.clone(),
            Arc::new(LocalFetcher::new()),
        );

        Self {
            _temp: temp,
            leader,
            cache,
            store,
            layout,
            repo: Arc::new(repo),
        }
    }

    async fn assign(&self, job: &JobId) {
        let dir = write_leader_artifacts(&self.leader, job).unwrap();
        self.assign_dir(job, &dir).await;
    }

    async fn assign_dir(&self, job: &JobId, dir: &Path) {
        publish_assignment(self.store.as_ref(), &self.layout, job, &dir.to_string_lossy())
            .await
            .unwrap();
    }

    async fn read(&self, job: &JobId, kind: ArtifactKind) -> Vec<u8> {
        let path = format!("stormdist/{job}/{}", kind.file_name());
        let mut reader = self.repo.open(&path).await.unwrap();
        let mut contents = Vec::new();
        reader.read_to_end(&mut contents).await.unwrap();
        contents
    }

    fn installer(&self) -> AtomicInstaller {
        AtomicInstaller::new(&self.cache)
    }
}

async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("condition not reached within 5s");
}

#[tokio::test]
async fn test_missing_job_does_not_block_others() {
    init_tracing();
    let cluster = Cluster::new(Duration::from_secs(3600));
    let a = job("topology-a-1");
    let b = job("topology-b-2");

    cluster.assign(&a).await;
    cluster.assign_dir(&b, &cluster.leader.join("never-uploaded")).await;
    cluster.repo.init().await.unwrap();

    for _ in 0..2 {
        let report = cluster.repo.reconcile_now().await;
        assert_eq!(report.failed_jobs(), vec![&b]);
        assert_eq!(report.failed[0].1.kind(), SyncErrorKind::NotFound);
    }

    assert!(cluster.installer().is_installed(&a).await.unwrap());
    assert!(!cluster.installer().job_dir(&b).exists());
    for kind in ArtifactKind::ALL {
        assert_eq!(cluster.read(&a, kind).await, artifact_contents(&a, kind));
    }
    assert_eq!(
        std::fs::read_dir(cluster.cache.join("tmp")).unwrap().count(),
        0
    );

    cluster.assign(&b).await;
    let report = cluster.repo.reconcile_now().await;
    assert_eq!(report.installed, vec![b.clone()]);
    assert!(report.failed.is_empty());

    cluster.repo.shutdown().await;
}

#[tokio::test]
async fn test_background_loop_converges() {
    init_tracing();
    let cluster = Cluster::new(Duration::from_millis(50));
    let jobs: Vec<JobId> = (0..6).map(|i| job(&format!("wc-{i}"))).collect();
    for job in &jobs {
        cluster.assign(job).await;
    }

    cluster.repo.init().await.unwrap();
    assert!(cluster.repo.is_support_distributed());

    let installer = cluster.installer();
    eventually(|| {
        let installer = installer.clone();
        let jobs = jobs.clone();
        async move {
            for job in &jobs {
                if !installer.is_installed(job).await.unwrap() {
                    return false;
                }
            }
            true
        }
    })
    .await;

    let listed = cluster.repo.list("stormdist").await.unwrap().unwrap();
    assert_eq!(listed.len(), jobs.len());

    cluster.repo.shutdown().await;
}

#[tokio::test]
async fn test_installed_directories_are_never_partial() {
    init_tracing();
    let cluster = Cluster::new(Duration::from_secs(3600));
    let jobs: Vec<JobId> = (0..20).map(|i| job(&format!("bulk-{i}"))).collect();
    for job in &jobs {
        cluster.assign(job).await;
    }
    cluster.repo.init().await.unwrap();

    let observer = tokio::spawn({
        let installer = cluster.installer();
        let cache = cluster.cache.clone();
        async move {
            let mut observed = 0;
            for _ in 0..200 {
                if let Ok(entries) = std::fs::read_dir(cache.join("stormdist")) {
                    for entry in entries.flatten() {
                        let job = job(&entry.file_name().to_string_lossy());
                        assert!(installer.is_installed(&job).await.unwrap());
                        observed += 1;
                    }
                }
                tokio::task::yield_now().await;
            }
            observed
        }
    });

    let report = cluster.repo.reconcile_now().await;
    assert_eq!(report.installed.len(), jobs.len());
    observer.await.unwrap();

    cluster.repo.shutdown().await;
}

#[tokio::test]
async fn test_reinstall_is_idempotent_and_orphans_stay() {
    init_tracing();
    let cluster = Cluster::new(Duration::from_secs(3600));
    let a = job("wc-1");
    cluster.assign(&a).await;
    cluster.repo.init().await.unwrap();

    let first = cluster.repo.reconcile_now().await;
    assert_eq!(first.installed, vec![a.clone()]);
    let second = cluster.repo.reconcile_now().await;
    assert!(second.installed.is_empty());
    assert_eq!(second.present, 1);

    retract_assignment(cluster.store.as_ref(), &cluster.layout, &a)
        .await
        .unwrap();
    let other = job("wc-2");
    cluster.assign(&other).await;

    let third = cluster.repo.reconcile_now().await;
    assert_eq!(third.installed, vec![other]);
    assert_eq!(third.orphaned, vec![a.clone()]);
    assert!(cluster.installer().is_installed(&a).await.unwrap());

    cluster.repo.shutdown().await;
}

#[tokio::test]
async fn test_init_sweeps_stale_staging() {
    init_tracing();
    let cluster = Cluster::new(Duration::from_secs(3600));
    let stale = cluster.cache.join("tmp").join("crashed-download");
    std::fs::create_dir_all(&stale).unwrap();
    std::fs::write(stale.join("stormjar.jar"), b"half").unwrap();

    cluster.repo.init().await.unwrap();
    assert!(!stale.exists());
    assert!(cluster.cache.join("tmp").is_dir());

    cluster.repo.shutdown().await;
}

fn http_fetcher(server: &MockServer, token: Option<&str>) -> HttpFetcher {
    HttpFetcher::new(HttpFetcherConfig {
        base_url: server.uri(),
        auth_token: token.map(str::to_string),
        timeout: Duration::from_secs(5),
    })
    .unwrap()
}

#[tokio::test]
async fn test_http_fetcher_downloads_with_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/nimbus/stormdist/wc-1/stormjar.jar"))
        .and(header("authorization", "Bearer leader-secret"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jar-bytes".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("stormjar.jar");
    let bytes = http_fetcher(&server, Some("leader-secret"))
        .fetch("/nimbus/stormdist/wc-1", "stormjar.jar", &dest)
        .await
        .unwrap();

    assert_eq!(bytes, 9);
    assert_eq!(std::fs::read(&dest).unwrap(), b"jar-bytes");
}

#[tokio::test]
async fn test_http_fetcher_classifies_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/nimbus/stormdist/gone/stormcode.ser"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/nimbus/stormdist/broken/stormcode.ser"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let fetcher = http_fetcher(&server, None);

    let err = fetcher
        .fetch("/nimbus/stormdist/gone", "stormcode.ser", &temp.path().join("a"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let err = fetcher
        .fetch("/nimbus/stormdist/broken", "stormcode.ser", &temp.path().join("b"))
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Status { status: 503, .. }));
}

#[tokio::test]
async fn test_reconcile_over_http() {
    init_tracing();
    let server = MockServer::start().await;
    let wc = job("wc-http");
    for kind in ArtifactKind::ALL {
        Mock::given(method("GET"))
            .and(path(format!("/nimbus/stormdist/wc-http/{}", kind.file_name())))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(artifact_contents(&wc, kind)))
            .mount(&server)
            .await;
    }

    let temp = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    let layout = StoreLayout::default();
    publish_assignment(store.as_ref(), &layout, &wc, "/nimbus/stormdist/wc-http")
        .await
        .unwrap();

    let fetcher: Arc<dyn ArtifactFetcher> = Arc::new(http_fetcher(&server, None));
    let repo = CachedRepository::new(
        CachedRepositoryConfig {
            root: temp.path().join("nimbus"),
            layout,
            reconciler: ReconcilerConfig::default(),
        },
        store,
        fetcher,
    );
    repo.init().await.unwrap();

    let report = repo.reconcile_now().await;
    assert_eq!(report.installed, vec![wc.clone()]);
    let installed = temp.path().join("nimbus/stormdist/wc-http/stormconf.ser");
    assert_eq!(
        std::fs::read(installed).unwrap(),
        artifact_contents(&wc, ArtifactKind::Config)
    );

    repo.shutdown().await;
}
