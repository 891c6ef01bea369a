//! Fake container runtime used by the integration tests

#![allow(dead_code)]

use gateway_core::{
    DataServices, MemoryStore, Principal, ResourceControl, ResourceControlType, TeamId, UserId, UserRole,
};
use gateway_proxy::{ProxyFactory, ProxyMetrics};
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::HeaderMap;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;

#[derive(Clone, Debug)]
pub struct Recorded {
    pub method: Method,
    pub uri: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Every request the fake runtime received, in arrival order
#[derive(Clone, Default)]
pub struct Recorder {
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl Recorder {
    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last(&self) -> Recorded {
        self.requests.lock().unwrap().last().cloned().expect("no request recorded")
    }
}

fn canned(method: &Method, path: &str) -> (StatusCode, Value) {
    match (method.as_str(), path) {
        ("GET", "/containers/json") | ("GET", "/v1.41/containers/json") => (
            StatusCode::OK,
            json!([
                {"Id": "c1", "Names": ["/web"], "Labels": {}},
                {"Id": "c2", "Names": ["/db"], "Labels": {}},
                {"Id": "c3", "Names": ["/worker"], "Labels": {"com.docker.stack.namespace": "shop"}},
                {"Id": "c4", "Names": ["/agent"], "Labels": {"io.portainer.agent": "true"}}
            ]),
        ),
        ("GET", "/containers/c2/json") => (
            StatusCode::OK,
            json!({"Id": "c2", "Name": "/db", "Config": {"Labels": {}}}),
        ),
        ("GET", "/containers/db/json") => (
            StatusCode::OK,
            json!({"Id": "c2", "Name": "/db", "Config": {"Labels": {}}}),
        ),
        ("GET", "/containers/c5/json") => (
            StatusCode::OK,
            json!({"Id": "c5", "Name": "/api", "Config": {"Labels": {"com.docker.swarm.service.id": "svc1"}}}),
        ),
        ("GET", "/volumes") => (
            StatusCode::OK,
            json!({"Volumes": [{"Name": "private-data"}, {"Name": "shared"}], "Warnings": null}),
        ),
        ("POST", "/containers/create") => (StatusCode::CREATED, json!({"Id": "new", "Warnings": []})),
        ("GET", "/containers/missing/json") => (
            StatusCode::NOT_FOUND,
            json!({"message": "No such container: missing"}),
        ),
        _ => (StatusCode::OK, json!({"ok": true})),
    }
}

async fn answer(
    request: Request<Incoming>,
    recorder: Recorder,
    name: &'static str,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = request.into_parts();
    let body = body.collect().await.map(|c| c.to_bytes()).unwrap_or_default();

    recorder.requests.lock().unwrap().push(Recorded {
        method: parts.method.clone(),
        uri: parts.uri.to_string(),
        headers: parts.headers.clone(),
        body,
    });

    if parts.uri.path() == "/slow" {
        tokio::time::sleep(Duration::from_millis(300)).await;
    }

    let (status, document) = canned(&parts.method, parts.uri.path());
    let bytes = serde_json::to_vec(&document).unwrap();
    Ok(Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .header("x-runtime", name)
        .body(Full::new(Bytes::from(bytes)))
        .unwrap())
}

pub fn serve<S>(stream: S, recorder: Recorder, name: &'static str)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let service = service_fn(move |request| answer(request, recorder.clone(), name));
        let _ = http1::Builder::new()
            .serve_connection(TokioIo::new(stream), service)
            .await;
    });
}

#[cfg(unix)]
pub async fn spawn_unix(path: &std::path::Path) -> Recorder {
    let listener = tokio::net::UnixListener::bind(path).unwrap();
    let recorder = Recorder::default();
    let accepted = recorder.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            serve(stream, accepted.clone(), "unix");
        }
    });
    recorder
}

pub async fn spawn_tcp(name: &'static str) -> (SocketAddr, Recorder) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let recorder = Recorder::default();
    let accepted = recorder.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            serve(stream, accepted.clone(), name);
        }
    });
    (addr, recorder)
}

pub async fn spawn_tls(acceptor: tokio_rustls::TlsAcceptor) -> (SocketAddr, Recorder) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let recorder = Recorder::default();
    let accepted = recorder.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let acceptor = acceptor.clone();
            let recorder = accepted.clone();
            tokio::spawn(async move {
                if let Ok(tls) = acceptor.accept(stream).await {
                    serve(tls, recorder, "tls");
                }
            });
        }
    });
    (addr, recorder)
}

/// Store with c2 owned by user 2, the `shop` stack shared with team 10 and a
/// private volume owned by user 2
pub async fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store
        .put_resource_control(control(1, "c2", ResourceControlType::Container, &[2], &[]))
        .await;
    store
        .put_resource_control(control(2, "shop", ResourceControlType::Stack, &[], &[10]))
        .await;
    store
        .put_resource_control(control(3, "private-data", ResourceControlType::Volume, &[2], &[]))
        .await;
    store
}

pub fn control(id: u32, resource_id: &str, kind: ResourceControlType, users: &[u32], teams: &[u32]) -> ResourceControl {
    ResourceControl {
        id,
        resource_id: resource_id.to_string(),
        sub_resource_ids: vec![],
        resource_type: kind,
        public: false,
        user_accesses: users.iter().map(|u| UserId(*u)).collect(),
        team_accesses: teams.iter().map(|t| TeamId(*t)).collect(),
    }
}

pub fn factory(store: Arc<MemoryStore>) -> ProxyFactory {
    ProxyFactory::new(DataServices::from_store(store), ProxyMetrics::new().unwrap())
}

pub fn standard(id: u32) -> Principal {
    Principal::new(UserId(id), format!("user{}", id), UserRole::Standard)
}

pub fn admin() -> Principal {
    Principal::new(UserId(1), "admin", UserRole::Administrator)
}

pub fn request(method: &str, uri: &str, principal: Option<Principal>, body: &str) -> Request<Full<Bytes>> {
    let mut request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap();
    if let Some(principal) = principal {
        request.extensions_mut().insert(principal);
    }
    request
}

pub async fn json<B>(response: Response<B>) -> Value
where
    B: hyper::body::Body,
    B::Error: std::fmt::Debug,
{
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
