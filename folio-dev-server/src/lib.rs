use anyhow::Result;
use axum::{
    Router,
    extract::{
        Request, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use percent_encoding::percent_decode_str;
use std::{
    net::SocketAddr,
    path::{Component, Path, PathBuf},
};
use tokio::sync::broadcast;
use tower::ServiceExt;
use tower_http::services::ServeDir;
use tracing::{debug, info, warn};

const RELOAD_PATH: &str = "/__livereload";
const RELOAD_MESSAGE: &str = "reload";

/// Where and how [`LiveServer`] listens.
#[derive(Debug, Clone)]
pub struct LiveServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory to serve; may be swapped out wholesale between requests
    pub root: PathBuf,
    /// Open the site in the default browser once listening
    pub open: bool,
}

impl Default for LiveServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            root: PathBuf::from("public"),
            open: false,
        }
    }
}

/// Tells connected browsers to reload.
#[derive(Clone)]
pub struct ReloadHandle {
    tx: broadcast::Sender<String>,
}

impl ReloadHandle {
    /// Returns how many browsers were notified.
    pub fn reload(&self) -> usize {
        let clients = self.tx.send(RELOAD_MESSAGE.to_string()).unwrap_or(0);
        debug!("Sent reload to {} clients", clients);
        clients
    }
}

/// A static file server that injects a live-reload client into every HTML
/// page. It does not watch anything itself; whoever rebuilds the site calls
/// [`ReloadHandle::reload`].
pub struct LiveServer {
    config: LiveServerConfig,
    reload_tx: broadcast::Sender<String>,
}

impl LiveServer {
    pub fn new(config: LiveServerConfig) -> Self {
        let (reload_tx, _) = broadcast::channel(16);
        Self { config, reload_tx }
    }

    pub fn reload_handle(&self) -> ReloadHandle {
        ReloadHandle {
            tx: self.reload_tx.clone(),
        }
    }

    pub fn router(&self) -> Router {
        let state = AppState {
            root: self.config.root.clone(),
            reload_tx: self.reload_tx.clone(),
        };
        Router::new()
            .route(RELOAD_PATH, get(websocket_handler))
            .fallback(serve_file)
            .with_state(state)
    }

    pub async fn run(self) -> Result<()> {
        if !self.config.root.exists() {
            anyhow::bail!("Nothing to serve: {} does not exist", self.config.root.display());
        }

        let app = self.router();
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port).parse()?;
        let listener = tokio::net::TcpListener::bind(addr).await?;

        info!("Serving {} at http://{}", self.config.root.display(), addr);

        if self.config.open
            && let Err(e) = open::that(format!("http://{}", addr))
        {
            warn!("Failed to open browser: {}", e);
        }

        axum::serve(listener, app).await?;
        Ok(())
    }
}

#[derive(Clone)]
struct AppState {
    root: PathBuf,
    reload_tx: broadcast::Sender<String>,
}

async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| forward_reloads(socket, state.reload_tx))
}

async fn forward_reloads(mut socket: WebSocket, reload_tx: broadcast::Sender<String>) {
    let mut reloads = reload_tx.subscribe();

    if socket
        .send(Message::Text("connected".to_string().into()))
        .await
        .is_err()
    {
        return;
    }

    loop {
        tokio::select! {
            msg = reloads.recv() => {
                match msg {
                    Ok(message) => {
                        if socket.send(Message::Text(message.into())).await.is_err() {
                            break;
                        }
                    }
                    // Missed messages all say "reload"; one is enough.
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = socket.recv() => {
                if msg.is_none() {
                    break;
                }
            }
        }
    }
}

/// HTML goes through the script injector; everything else is served as is.
async fn serve_file(State(state): State<AppState>, request: Request) -> Response {
    if let Some(path) = html_file_for(&state.root, request.uri().path()) {
        match tokio::fs::read_to_string(&path).await {
            Ok(html) => return Html(inject_livereload_script(&html)).into_response(),
            Err(e) => debug!("Could not read {}: {}", path.display(), e),
        }
    }

    // A fresh ServeDir per request: the root is replaced by rename on every
    // rebuild.
    match ServeDir::new(&state.root).oneshot(request).await {
        Ok(response) => response.into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// The HTML file a request path maps to, if there is one.
pub fn html_file_for(root: &Path, uri_path: &str) -> Option<PathBuf> {
    let decoded = percent_decode_str(uri_path).decode_utf8().ok()?;
    let relative = Path::new(decoded.trim_start_matches('/'));
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return None;
    }

    let mut path = root.join(relative);
    if uri_path.ends_with('/') || path.is_dir() {
        path.push("index.html");
    }

    let is_html = path
        .extension()
        .is_some_and(|ext| ext == "html" || ext == "htm");
    (is_html && path.is_file()).then_some(path)
}

/// Inject the live reload client before `</body>`, or at the end if there
/// is no closing body tag.
pub fn inject_livereload_script(html: &str) -> String {
    let script = format!(
        r#"
<script>
(function() {{
    const scheme = location.protocol === 'https:' ? 'wss://' : 'ws://';
    const socket = new WebSocket(scheme + location.host + '{RELOAD_PATH}');
    socket.onmessage = function(event) {{
        if (event.data === '{RELOAD_MESSAGE}') {{
            location.reload();
        }}
    }};
    socket.onclose = function() {{
        console.log('folio: live reload disconnected');
    }};
}})();
</script>
"#
    );

    if let Some(pos) = html.rfind("</body>") {
        let mut result = String::with_capacity(html.len() + script.len());
        result.push_str(&html[..pos]);
        result.push_str(&script);
        result.push_str(&html[pos..]);
        result
    } else {
        format!("{html}{script}")
    }
}
