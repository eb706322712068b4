//! `esms` serve command.
//!
//! ```text
//! GET /            → 307 to the index page
//! GET /src/app     → ModuleServer (blocking pool) → transformed module
//! GET /logo.png    → static files from the project root
//! OPTIONS *        → CORS preflight
//! ```

use axum::{
    extract::{Request, State},
    http::{
        header::{
            ACCEPT, AUTHORIZATION, CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE, IF_MODIFIED_SINCE,
            LAST_MODIFIED,
        },
        HeaderName, HeaderValue, Method, StatusCode,
    },
    middleware::{self, Next},
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use esms_core::{
    load_config, EsmsOptions, Error, ModuleRequest, ModuleServer, ServeOutcome, ServedModule,
};
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
};

/// Serve action, as parsed from the command line.
#[derive(Debug, Clone, Default)]
pub struct ServeAction {
    pub root: PathBuf,
    pub port: Option<u16>,
    pub host: Option<String>,
    pub index: Option<String>,
    /// Explicit config file (overrides discovery).
    pub config: Option<PathBuf>,
}

/// Run the server until the process is stopped.
pub async fn run(action: ServeAction) -> Result<()> {
    let root = std::fs::canonicalize(&action.root)
        .map_err(|_| Error::RootNotFound {
            root: action.root.clone(),
        })
        .into_diagnostic()?;

    let options = resolve_options(&action, &root)?;
    let server = Arc::new(ModuleServer::new(root.clone(), options.clone()).into_diagnostic()?);

    let addr = options.address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .into_diagnostic()?;

    tracing::info!(root = %root.display(), "serving at http://{addr}");
    axum::serve(listener, router(server)).await.into_diagnostic()?;

    Ok(())
}

/// Defaults, then the config file, then explicit flags.
pub fn resolve_options(action: &ServeAction, root: &std::path::Path) -> Result<EsmsOptions> {
    let mut options = EsmsOptions::default();

    if let Some((path, file)) = load_config(root, action.config.as_deref()).into_diagnostic()? {
        tracing::info!(path = %path.display(), "using config file");
        options = file.apply(options);
    }

    if let Some(port) = action.port {
        options = options.with_port(port);
    }
    if let Some(host) = &action.host {
        options = options.with_host(host.clone());
    }
    if let Some(index) = &action.index {
        options = options.with_index(index.clone());
    }

    Ok(options)
}

/// Build the application router for `server`.
pub fn router(server: Arc<ModuleServer>) -> Router {
    let index = format!("/{}", server.options().index.trim_start_matches('/'));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::PUT,
            Method::POST,
            Method::GET,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            CONTENT_TYPE,
            CONTENT_LENGTH,
            AUTHORIZATION,
            ACCEPT,
            HeaderName::from_static("x-requested-with"),
        ]);

    Router::new()
        .route(
            "/",
            get(move || {
                let index = index.clone();
                async move { Redirect::temporary(&index) }
            }),
        )
        .fallback_service(ServeDir::new(server.root()))
        .layer(middleware::from_fn_with_state(server, serve_module))
        .layer(cors)
}

/// Answer module requests; everything else goes on to the router.
async fn serve_module(
    State(server): State<Arc<ModuleServer>>,
    request: Request,
    next: Next,
) -> Response {
    if !matches!(*request.method(), Method::GET | Method::HEAD) {
        return next.run(request).await;
    }

    // Nothing borrowed from `request` may live across an await.
    let module_request = module_request(&request);
    let path = module_request.path.clone();

    let outcome = tokio::task::spawn_blocking(move || server.load(&module_request)).await;

    match outcome {
        Ok(Ok(ServeOutcome::Module(module))) => module_response(module),
        Ok(Ok(ServeOutcome::NotModified)) => StatusCode::NOT_MODIFIED.into_response(),
        Ok(Ok(ServeOutcome::NotFound)) => StatusCode::NOT_FOUND.into_response(),
        Ok(Ok(ServeOutcome::Fallthrough)) => next.run(request).await,
        Ok(Err(e)) => {
            tracing::error!(path = %path, error = %e, "failed to serve module");
            error_response(&e.to_string())
        }
        Err(e) => {
            tracing::error!(path = %path, error = %e, "module task failed");
            error_response(&e.to_string())
        }
    }
}

fn module_request(request: &Request) -> ModuleRequest {
    let header = |name: &str| {
        request
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
    };

    ModuleRequest {
        path: request.uri().path().to_string(),
        if_modified_since: header(IF_MODIFIED_SINCE.as_str()),
        sec_fetch_dest: header("sec-fetch-dest"),
    }
}

fn module_response(module: ServedModule) -> Response {
    let mut response = (
        StatusCode::OK,
        [
            (CONTENT_TYPE, module.content_type),
            (CACHE_CONTROL, module.cache_control),
        ],
        module.body,
    )
        .into_response();

    if let Some(value) = module
        .last_modified
        .and_then(|date| HeaderValue::from_str(&date).ok())
    {
        response.headers_mut().insert(LAST_MODIFIED, value);
    }

    response
}

fn error_response(message: &str) -> Response {
    let literal = serde_json::to_string(message).unwrap_or_else(|_| "\"\"".to_string());
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        [(CONTENT_TYPE, esms_core::serve::CONTENT_TYPE_JS)],
        format!("console.error({literal});\n"),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::net::SocketAddr;
    use tempfile::{tempdir, TempDir};

    fn project() -> TempDir {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        fs::write(root.join("index.html"), "<h1>esms</h1>").unwrap();
        fs::write(
            root.join("src/main.ts"),
            "import p from 'pkg';\nexport const v: number = p;\n",
        )
        .unwrap();
        fs::write(root.join("src/broken.js"), "let = ;\n").unwrap();
        fs::write(root.join("node_modules/pkg/package.json"), r#"{"main":"index.js"}"#).unwrap();
        fs::write(root.join("node_modules/pkg/index.js"), "module.exports = 1;\n").unwrap();
        dir
    }

    async fn spawn(dir: &TempDir) -> SocketAddr {
        let server = Arc::new(ModuleServer::new(dir.path(), EsmsOptions::default()).unwrap());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(server)).await.unwrap();
        });
        addr
    }

    fn client() -> reqwest::Client {
        reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_serves_transformed_module() {
        let dir = project();
        let addr = spawn(&dir).await;

        let response = client()
            .get(format!("http://{addr}/src/main"))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        let headers = response.headers();
        assert_eq!(
            headers.get("content-type").unwrap(),
            "application/javascript; charset=UTF-8"
        );
        assert_eq!(
            headers.get("cache-control").unwrap(),
            "no-cache, no-store, must-revalidate, max-age=0"
        );
        assert!(headers.get("last-modified").is_some());

        let body = response.text().await.unwrap();
        assert!(body.contains("/node_modules/pkg/index.js"), "{body}");
    }

    #[tokio::test]
    async fn test_node_modules_cache_header() {
        let dir = project();
        let addr = spawn(&dir).await;

        let response = client()
            .get(format!("http://{addr}/node_modules/pkg/index.js"))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(response.headers().get("cache-control").unwrap(), "max-age=100000");
        let body = response.text().await.unwrap();
        assert!(body.contains("export default exports.default || module.exports;"));
    }

    #[test]
    fn test_module_request_from_headers() {
        let request = axum::http::Request::builder()
            .uri("/src/data.json?v=1")
            .header(IF_MODIFIED_SINCE, "Tue, 15 Nov 1994 08:12:31 GMT")
            .header("Sec-Fetch-Dest", "script")
            .body(axum::body::Body::empty())
            .unwrap();

        let module_request = module_request(&request);
        assert_eq!(module_request.path, "/src/data.json");
        assert_eq!(
            module_request.if_modified_since.as_deref(),
            Some("Tue, 15 Nov 1994 08:12:31 GMT")
        );
        assert_eq!(module_request.sec_fetch_dest.as_deref(), Some("script"));
    }

    #[tokio::test]
    async fn test_json_served_as_script() {
        let dir = project();
        fs::write(dir.path().join("src/data.json"), "{\"a\":1}").unwrap();
        let addr = spawn(&dir).await;

        let response = client()
            .get(format!("http://{addr}/src/data.json"))
            .header("Sec-Fetch-Dest", "script")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/javascript; charset=UTF-8"
        );
        assert_eq!(response.text().await.unwrap(), "export default {\"a\":1};\n");
    }

    #[tokio::test]
    async fn test_unknown_path_is_404() {
        let dir = project();
        let addr = spawn(&dir).await;

        let response = client()
            .get(format!("http://{addr}/src/nope"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 404);
    }

    #[tokio::test]
    async fn test_root_redirects_to_index() {
        let dir = project();
        let addr = spawn(&dir).await;

        let response = client().get(format!("http://{addr}/")).send().await.unwrap();
        assert_eq!(response.status(), 307);
        assert_eq!(response.headers().get("location").unwrap(), "/index.html");
    }

    #[tokio::test]
    async fn test_static_fallthrough() {
        let dir = project();
        let addr = spawn(&dir).await;

        let response = client()
            .get(format!("http://{addr}/index.html"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.text().await.unwrap(), "<h1>esms</h1>");
    }

    #[tokio::test]
    async fn test_parse_error_is_500() {
        let dir = project();
        let addr = spawn(&dir).await;

        let response = client()
            .get(format!("http://{addr}/src/broken.js"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 500);
        let body = response.text().await.unwrap();
        assert!(body.starts_with("console.error("), "{body}");

        // The server keeps answering other requests.
        let response = client()
            .get(format!("http://{addr}/src/main.ts"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn test_not_modified() {
        let dir = project();
        let addr = spawn(&dir).await;

        let response = client()
            .get(format!("http://{addr}/src/main.ts"))
            .header("If-Modified-Since", "Fri, 01 Jan 2100 00:00:00 GMT")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 304);
    }

    #[tokio::test]
    async fn test_cors_headers() {
        let dir = project();
        let addr = spawn(&dir).await;

        let response = client()
            .get(format!("http://{addr}/src/main.ts"))
            .header("Origin", "http://example.com")
            .send()
            .await
            .unwrap();
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );
    }

    #[test]
    fn test_cli_flags_override_config() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("esms.config.ts"),
            "export default { port: 8080, host: '0.0.0.0' };",
        )
        .unwrap();

        let from_config = resolve_options(&ServeAction::default(), dir.path()).unwrap();
        assert_eq!(from_config.port, 8080);
        assert_eq!(from_config.host, "0.0.0.0");
        assert_eq!(from_config.index, "index.html");

        let action = ServeAction {
            port: Some(9000),
            ..Default::default()
        };
        let overridden = resolve_options(&action, dir.path()).unwrap();
        assert_eq!(overridden.port, 9000);
        assert_eq!(overridden.host, "0.0.0.0");
    }
}
