//! API HTTP/JSON sobre o [`SnapshotStore`].
//!
//! Cada rota só faz `try_read` e serializa. Se o store estiver ocupado ou
//! ainda sem dados, responde `503` em vez de esperar.

use axum::Router;
use axum::extract::State;
use axum::http::header::ACCESS_CONTROL_ALLOW_ORIGIN;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use mahm_core::config::ServerConfig;
use mahm_core::poller::{StateCell, unix_now};
use mahm_core::{SensorReading, Snapshot, SnapshotStore};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use sysinfo::{ProcessesToUpdate, System};
use tracing::{debug, info, warn};

/// Estado compartilhado entre os handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SnapshotStore>,
    pub poller: StateCell,
    pub allow_origin: HeaderValue,
}

impl AppState {
    pub fn new(store: Arc<SnapshotStore>, poller: StateCell, allow_origin: &str) -> Self {
        let allow_origin = HeaderValue::from_str(allow_origin).unwrap_or_else(|_| {
            warn!("allow_origin inválido: {allow_origin:?}, usando \"*\"");
            HeaderValue::from_static("*")
        });
        Self {
            store,
            poller,
            allow_origin,
        }
    }

    /// Resposta JSON com o header CORS configurado.
    fn json<T: Serialize>(&self, status: StatusCode, body: T) -> Response {
        (
            status,
            [(ACCESS_CONTROL_ALLOW_ORIGIN, self.allow_origin.clone())],
            axum::Json(body),
        )
            .into_response()
    }

    fn unavailable(&self) -> Response {
        self.json(
            StatusCode::SERVICE_UNAVAILABLE,
            json!({ "error": "Data not available" }),
        )
    }

    /// Serializa um subconjunto do snapshot atual.
    fn subset(&self, pick: fn(&Snapshot) -> &[SensorReading]) -> Response {
        match self.store.try_read() {
            Ok(snapshot) => self.json(StatusCode::OK, pick(&snapshot)),
            Err(e) => {
                debug!("Leitura recusada: {e}");
                self.unavailable()
            }
        }
    }
}

/// Monta o router com todas as rotas.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/fps", get(fps))
        .route("/gpu", get(gpu))
        .route("/cpu", get(cpu))
        .route("/memory", get(memory))
        .route("/all", get(all))
        .route("/status", get(status))
        .route("/debug/memory", get(debug_memory))
        .with_state(state)
}

/// Escuta em `cfg.bind_addr()` até `shutdown` completar.
pub async fn serve(
    cfg: &ServerConfig,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(cfg.bind_addr()).await?;
    info!("Servidor HTTP escutando em {}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

// ──────────────────────────────────────────────
// Handlers
// ──────────────────────────────────────────────

async fn root(State(state): State<AppState>) -> Response {
    state.json(
        StatusCode::OK,
        json!({
            "service": "FPS Monitor",
            "version": env!("CARGO_PKG_VERSION"),
            "endpoints": {
                "cpu": "/cpu",
                "fps": "/fps",
                "gpu": "/gpu",
                "memory": "/memory",
                "all": "/all"
            }
        }),
    )
}

async fn fps(State(state): State<AppState>) -> Response {
    state.subset(Snapshot::fps)
}

async fn gpu(State(state): State<AppState>) -> Response {
    state.subset(Snapshot::gpu)
}

async fn cpu(State(state): State<AppState>) -> Response {
    state.subset(Snapshot::cpu)
}

async fn memory(State(state): State<AppState>) -> Response {
    state.subset(Snapshot::memory)
}

async fn all(State(state): State<AppState>) -> Response {
    state.subset(Snapshot::all)
}

/// Snapshot completo com contadores.
#[derive(Serialize)]
struct StatusBody<'a> {
    timestamp: i64,
    fps: &'a [SensorReading],
    gpu: &'a [SensorReading],
    cpu: &'a [SensorReading],
    memory: &'a [SensorReading],
    all: &'a [SensorReading],
    fps_count: usize,
    gpu_count: usize,
    cpu_count: usize,
    memory_count: usize,
    all_count: usize,
}

impl<'a> From<&'a Snapshot> for StatusBody<'a> {
    fn from(s: &'a Snapshot) -> Self {
        Self {
            timestamp: s.timestamp(),
            fps: s.fps(),
            gpu: s.gpu(),
            cpu: s.cpu(),
            memory: s.memory(),
            all: s.all(),
            fps_count: s.fps().len(),
            gpu_count: s.gpu().len(),
            cpu_count: s.cpu().len(),
            memory_count: s.memory().len(),
            all_count: s.all().len(),
        }
    }
}

async fn status(State(state): State<AppState>) -> Response {
    match state.store.try_read() {
        Ok(snapshot) => state.json(StatusCode::OK, StatusBody::from(snapshot.as_ref())),
        Err(_) => state.unavailable(),
    }
}

/// Diagnóstico de memória do próprio processo.
#[derive(Serialize)]
struct MemInfo {
    resident_mb: u64,
    virtual_mb: u64,
    poller_state: &'static str,
    timestamp: i64,
}

async fn debug_memory(State(state): State<AppState>) -> Response {
    let (resident, virt) = process_memory();
    state.json(
        StatusCode::OK,
        MemInfo {
            resident_mb: resident / 1024 / 1024,
            virtual_mb: virt / 1024 / 1024,
            poller_state: state.poller.get().as_str(),
            timestamp: unix_now(),
        },
    )
}

/// (residente, virtual) em bytes, ou zeros se o processo não for encontrado.
fn process_memory() -> (u64, u64) {
    let Ok(pid) = sysinfo::get_current_pid() else {
        return (0, 0);
    };
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    sys.process(pid)
        .map(|p| (p.memory(), p.virtual_memory()))
        .unwrap_or((0, 0))
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use mahm_core::types::{Category, SnapshotBuilder};
    use tower::ServiceExt;

    fn reading(name: &str, value: Option<f32>, unit: &str) -> SensorReading {
        SensorReading {
            name: name.into(),
            value,
            unit: unit.into(),
            gpu_index: 0,
            category: Category::classify(name),
            timestamp: 1_700_000_000,
        }
    }

    fn populated_store() -> Arc<SnapshotStore> {
        let mut b = SnapshotBuilder::new(1_700_000_000);
        b.push(reading("GPU Temperature", Some(65.0), "C"));
        b.push(reading("Framerate", Some(144.0), "fps"));
        b.push(reading("GPU1 fan tachometer", None, "RPM"));
        b.push(reading("Fan speed", Some(40.0), "%"));

        let store = Arc::new(SnapshotStore::new());
        assert!(store.try_publish(b.build()));
        store
    }

    async fn get_json(store: Arc<SnapshotStore>, uri: &str) -> (StatusCode, serde_json::Value) {
        let app = router(AppState::new(store, StateCell::default(), "*"));
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();

        let status = resp.status();
        assert_eq!(
            resp.headers()
                .get(ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap()
                .to_str()
                .unwrap(),
            "*"
        );
        assert!(
            resp.headers()
                .get(axum::http::header::CONTENT_TYPE)
                .unwrap()
                .to_str()
                .unwrap()
                .starts_with("application/json")
        );

        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn root_lists_endpoints() {
        let (status, body) = get_json(Arc::new(SnapshotStore::new()), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"], "FPS Monitor");
        assert_eq!(body["endpoints"]["fps"], "/fps");
        assert_eq!(body["endpoints"]["memory"], "/memory");
    }

    #[tokio::test]
    async fn category_routes_return_subsets() {
        let store = populated_store();

        let (status, gpu) = get_json(store.clone(), "/gpu").await;
        assert_eq!(status, StatusCode::OK);
        let gpu = gpu.as_array().unwrap();
        assert_eq!(gpu.len(), 2);
        assert_eq!(gpu[0]["name"], "GPU Temperature");
        assert_eq!(gpu[0]["value"], 65.0);
        assert_eq!(gpu[0]["category"], "gpu");
        assert_eq!(gpu[0]["timestamp"], 1_700_000_000);
        // Sentinela: chave `value` omitida
        assert!(gpu[1].get("value").is_none());

        let (_, fps) = get_json(store.clone(), "/fps").await;
        assert_eq!(fps.as_array().unwrap().len(), 1);

        let (_, cpu) = get_json(store.clone(), "/cpu").await;
        assert!(cpu.as_array().unwrap().is_empty());

        let (_, all) = get_json(store, "/all").await;
        assert_eq!(all.as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn status_includes_counts() {
        let (status, body) = get_json(populated_store(), "/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["gpu_count"], 2);
        assert_eq!(body["fps_count"], 1);
        assert_eq!(body["cpu_count"], 0);
        assert_eq!(body["memory_count"], 0);
        assert_eq!(body["all_count"], 4);
        assert_eq!(body["timestamp"], 1_700_000_000);
    }

    #[tokio::test]
    async fn unavailable_before_first_publish() {
        for uri in ["/fps", "/gpu", "/cpu", "/memory", "/all", "/status"] {
            let (status, body) = get_json(Arc::new(SnapshotStore::new()), uri).await;
            assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE, "{uri}");
            assert_eq!(body["error"], "Data not available");
        }
    }

    #[tokio::test]
    async fn empty_snapshot_is_ok_with_no_entries() {
        let store = Arc::new(SnapshotStore::new());
        assert!(store.try_publish(Snapshot::empty(1)));
        let (status, body) = get_json(store, "/memory").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn debug_memory_reports_process() {
        let (status, body) = get_json(Arc::new(SnapshotStore::new()), "/debug/memory").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["poller_state"], "idle");
        assert!(body["timestamp"].as_i64().unwrap() > 0);
        assert!(body.get("resident_mb").is_some());
    }

    #[test]
    fn invalid_origin_falls_back_to_wildcard() {
        let state = AppState::new(Arc::new(SnapshotStore::new()), StateCell::default(), "bad\norigin");
        assert_eq!(state.allow_origin, "*");
    }
}
