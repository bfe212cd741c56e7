use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use chatkv::config::LimitsConfig;
use chatkv::store::memory::MemoryExecutor;
use chatkv::Database;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

/// Repository over a fresh in-memory store.
#[allow(dead_code)]
pub fn memory_db(limits: LimitsConfig) -> (Database, Arc<MemoryExecutor>) {
    let store = Arc::new(MemoryExecutor::new());
    (Database::new(store.clone(), limits), store)
}

/// A command proxy running on an ephemeral port. Dropping it stops the
/// server.
#[allow(dead_code)]
pub struct RunningProxy {
    pub addr: SocketAddr,
    pub store: Arc<MemoryExecutor>,
    _shutdown: oneshot::Sender<()>,
}

#[allow(dead_code)]
impl RunningProxy {
    pub fn url(&self) -> String {
        format!("http://{}/", self.addr)
    }
}

#[allow(dead_code)]
pub async fn start_proxy() -> RunningProxy {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind ephemeral port");
    let addr = listener.local_addr().expect("no local addr");
    let store = Arc::new(MemoryExecutor::new());
    let (tx, rx) = oneshot::channel::<()>();

    let executor = store.clone();
    tokio::spawn(async move {
        chatkv::proxy::serve(listener, executor, async {
            let _ = rx.await;
        })
        .await
        .expect("proxy failed");
    });

    RunningProxy {
        addr,
        store,
        _shutdown: tx,
    }
}
