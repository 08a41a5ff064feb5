//! Minimal Kubernetes API server for driving the real client in tests.
//!
//! Serves the core/v1 PersistentVolumeClaim and PersistentVolume endpoints
//! from an in-process object store over plain HTTP/1.1, one connection per
//! request. Every request line is journaled for assertions.

use std::collections::HashSet;
use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use parking_lot::Mutex;
use serde_json::{Value, json};

#[derive(Debug, Clone)]
struct Claim {
    name: String,
    namespace: String,
    volume: Option<String>,
}

#[derive(Debug, Clone)]
struct Volume {
    name: String,
    claim: Option<(String, String)>,
}

#[derive(Debug, Default)]
struct Store {
    claims: Vec<Claim>,
    volumes: Vec<Volume>,
    forbidden_namespaces: HashSet<String>,
    racing_volumes: HashSet<String>,
    failing_volume_listing: bool,
    requests: Vec<String>,
}

/// Builder for the served cluster state.
#[derive(Debug, Default)]
pub struct FakeCluster {
    store: Store,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim(mut self, namespace: &str, name: &str) -> Self {
        self.store.claims.push(Claim {
            name: name.to_string(),
            namespace: namespace.to_string(),
            volume: None,
        });
        self
    }

    pub fn bound_pair(mut self, namespace: &str, claim: &str, volume: &str) -> Self {
        self.store.claims.push(Claim {
            name: claim.to_string(),
            namespace: namespace.to_string(),
            volume: Some(volume.to_string()),
        });
        self.store.volumes.push(Volume {
            name: volume.to_string(),
            claim: Some((namespace.to_string(), claim.to_string())),
        });
        self
    }

    /// Listing and sweeping this namespace answers 403.
    pub fn forbidden_namespace(mut self, namespace: &str) -> Self {
        self.store.forbidden_namespaces.insert(namespace.to_string());
        self
    }

    /// Deleting this volume answers 404 because the platform reclaimed it first.
    pub fn racing_volume(mut self, name: &str) -> Self {
        self.store.racing_volumes.insert(name.to_string());
        self
    }

    /// Cluster-wide volume listing answers 500.
    pub fn failing_volume_listing(mut self) -> Self {
        self.store.failing_volume_listing = true;
        self
    }

    pub fn serve(self) -> FakeApiServer {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind fake API server");
        let addr = listener.local_addr().expect("fake API server address");
        let store = Arc::new(Mutex::new(self.store));
        let stop = Arc::new(AtomicBool::new(false));

        let accept_store = Arc::clone(&store);
        let accept_stop = Arc::clone(&stop);
        thread::spawn(move || {
            for stream in listener.incoming() {
                if accept_stop.load(Ordering::SeqCst) {
                    break;
                }
                let Ok(stream) = stream else { continue };
                let store = Arc::clone(&accept_store);
                thread::spawn(move || handle_connection(stream, &store));
            }
        });

        FakeApiServer { addr, store, stop }
    }
}

/// Running server; stops accepting when dropped.
pub struct FakeApiServer {
    addr: SocketAddr,
    store: Arc<Mutex<Store>>,
    stop: Arc<AtomicBool>,
}

impl FakeApiServer {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Write a kubeconfig whose current context points at this server.
    pub fn write_kubeconfig(&self, dir: &Path) -> PathBuf {
        let body = format!(
            r"apiVersion: v1
kind: Config
clusters:
- name: fake
  cluster:
    server: {}
contexts:
- name: fake
  context:
    cluster: fake
    user: fake
    namespace: default
current-context: fake
users:
- name: fake
  user: {{}}
",
            self.url()
        );
        let path = dir.join("kubeconfig");
        fs::write(&path, body).expect("write kubeconfig");
        path
    }

    /// Every request served so far as `METHOD /path` (query stripped).
    pub fn requests(&self) -> Vec<String> {
        self.store.lock().requests.clone()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter(|r| r.starts_with("DELETE "))
            .collect()
    }

    pub fn has_claim(&self, namespace: &str, name: &str) -> bool {
        self.store
            .lock()
            .claims
            .iter()
            .any(|c| c.namespace == namespace && c.name == name)
    }

    pub fn has_volume(&self, name: &str) -> bool {
        self.store.lock().volumes.iter().any(|v| v.name == name)
    }
}

impl Drop for FakeApiServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        let _ = TcpStream::connect(self.addr);
    }
}

// ──────────────────── HTTP plumbing ────────────────────

fn handle_connection(mut stream: TcpStream, store: &Mutex<Store>) {
    let Some((method, path)) = read_request(&stream) else {
        return;
    };
    let (code, body) = route(&mut store.lock(), &method, &path);
    let body = body.to_string();
    let response = format!(
        "HTTP/1.1 {code} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        reason_phrase(code),
        body.len()
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();
}

fn read_request(stream: &TcpStream) -> Option<(String, String)> {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).ok()? == 0 {
        return None;
    }

    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).ok()? == 0 {
            break;
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':')
            && name.eq_ignore_ascii_case("content-length")
        {
            content_length = value.trim().parse().unwrap_or(0);
        }
    }
    let mut body = vec![0; content_length];
    reader.read_exact(&mut body).ok()?;

    let mut parts = request_line.split_whitespace();
    let method = parts.next()?.to_string();
    let target = parts.next()?;
    let path = target.split('?').next().unwrap_or(target).to_string();
    Some((method, path))
}

const fn reason_phrase(code: u16) -> &'static str {
    match code {
        200 => "OK",
        403 => "Forbidden",
        404 => "Not Found",
        _ => "Internal Server Error",
    }
}

// ──────────────────── routing ────────────────────

fn route(store: &mut Store, method: &str, path: &str) -> (u16, Value) {
    store.requests.push(format!("{method} {path}"));
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    match (method, segments.as_slice()) {
        ("GET", ["api", "v1", "persistentvolumeclaims"]) => {
            (200, claim_list(store.claims.iter()))
        }
        (_, ["api", "v1", "namespaces", ns, "persistentvolumeclaims"])
            if store.forbidden_namespaces.contains(*ns) =>
        {
            (
                403,
                status(403, "Forbidden", "persistentvolumeclaims is forbidden"),
            )
        }
        ("GET", ["api", "v1", "namespaces", ns, "persistentvolumeclaims"]) => (
            200,
            claim_list(store.claims.iter().filter(|c| c.namespace == *ns)),
        ),
        ("DELETE", ["api", "v1", "namespaces", ns, "persistentvolumeclaims"]) => {
            let (removed, kept): (Vec<Claim>, Vec<Claim>) = store
                .claims
                .drain(..)
                .partition(|c| c.namespace == *ns);
            store.claims = kept;
            (200, claim_list(removed.iter()))
        }
        ("GET", ["api", "v1", "namespaces", ns, "persistentvolumeclaims", name]) => store
            .claims
            .iter()
            .find(|c| c.namespace == *ns && c.name == *name)
            .map_or_else(|| not_found("persistentvolumeclaims", name), |c| (200, claim_json(c))),
        ("DELETE", ["api", "v1", "namespaces", ns, "persistentvolumeclaims", name]) => {
            match store
                .claims
                .iter()
                .position(|c| c.namespace == *ns && c.name == *name)
            {
                Some(index) => (200, claim_json(&store.claims.remove(index))),
                None => not_found("persistentvolumeclaims", name),
            }
        }
        ("GET", ["api", "v1", "persistentvolumes"]) => {
            if store.failing_volume_listing {
                (500, status(500, "InternalError", "etcdserver: request timed out"))
            } else {
                (200, volume_list(store.volumes.iter()))
            }
        }
        ("GET", ["api", "v1", "persistentvolumes", name]) => store
            .volumes
            .iter()
            .find(|v| v.name == *name)
            .map_or_else(|| not_found("persistentvolumes", name), |v| (200, volume_json(v))),
        ("DELETE", ["api", "v1", "persistentvolumes", name]) => {
            let position = store.volumes.iter().position(|v| v.name == *name);
            match position {
                Some(index) if store.racing_volumes.contains(*name) => {
                    store.volumes.remove(index);
                    not_found("persistentvolumes", name)
                }
                Some(index) => (200, volume_json(&store.volumes.remove(index))),
                None => not_found("persistentvolumes", name),
            }
        }
        _ => not_found("resource", path),
    }
}

fn status(code: u16, reason: &str, message: &str) -> Value {
    json!({
        "kind": "Status",
        "apiVersion": "v1",
        "metadata": {},
        "status": "Failure",
        "message": message,
        "reason": reason,
        "code": code,
    })
}

fn not_found(resource: &str, name: &str) -> (u16, Value) {
    (
        404,
        status(404, "NotFound", &format!("{resource} \"{name}\" not found")),
    )
}

fn claim_json(claim: &Claim) -> Value {
    let spec = claim
        .volume
        .as_ref()
        .map_or_else(|| json!({}), |volume| json!({"volumeName": volume}));
    json!({
        "apiVersion": "v1",
        "kind": "PersistentVolumeClaim",
        "metadata": {"name": claim.name, "namespace": claim.namespace},
        "spec": spec,
    })
}

fn volume_json(volume: &Volume) -> Value {
    let spec = volume.claim.as_ref().map_or_else(
        || json!({}),
        |(namespace, name)| {
            json!({"claimRef": {"kind": "PersistentVolumeClaim", "name": name, "namespace": namespace}})
        },
    );
    json!({
        "apiVersion": "v1",
        "kind": "PersistentVolume",
        "metadata": {"name": volume.name},
        "spec": spec,
    })
}

fn claim_list<'a>(claims: impl Iterator<Item = &'a Claim>) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "PersistentVolumeClaimList",
        "metadata": {"resourceVersion": "1"},
        "items": claims.map(claim_json).collect::<Vec<_>>(),
    })
}

fn volume_list<'a>(volumes: impl Iterator<Item = &'a Volume>) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "PersistentVolumeList",
        "metadata": {"resourceVersion": "1"},
        "items": volumes.map(volume_json).collect::<Vec<_>>(),
    })
}
