//! HTTP server for a [`FunctionApp`].

use crate::error::{FrameworkError, RequestError};
use crate::function::FunctionError;
use crate::http::{FunctionRequest, FunctionResponse, Method};
use crate::invoke::error_response;
use crate::runtime::{FrameworkConfig, FunctionApp, ServerBackend};
use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Serves one [`FunctionApp`] over HTTP/1.
pub struct FunctionServer {
    /// Server configuration.
    config: FrameworkConfig,
    app: Arc<FunctionApp>,
}

impl FunctionServer {
    pub fn new(config: FrameworkConfig, app: FunctionApp) -> Self {
        Self {
            config,
            app: Arc::new(app),
        }
    }

    pub fn app(&self) -> Arc<FunctionApp> {
        self.app.clone()
    }

    /// Build the runtime selected by the configured backend and serve until
    /// the listener fails.
    pub fn run(self) -> Result<(), FrameworkError> {
        let runtime = match self.config.backend {
            ServerBackend::Async => tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?,
            ServerBackend::Threaded => tokio::runtime::Builder::new_multi_thread()
                .worker_threads(self.config.threads)
                .enable_all()
                .build()?,
        };
        runtime.block_on(self.serve())
    }

    /// Accept connections on the configured address.
    pub async fn serve(self) -> Result<(), FrameworkError> {
        let addr: SocketAddr = self
            .config
            .bind_addr()
            .parse()
            .map_err(|e| FrameworkError::InvalidConfig(format!("invalid bind address: {}", e)))?;
        let listener = TcpListener::bind(addr).await?;

        info!(
            "Function server listening on {} ({:?} backend)",
            addr, self.config.backend
        );

        let config = Arc::new(self.config);
        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let io = TokioIo::new(stream);

            let app = self.app.clone();
            let config = config.clone();

            tokio::task::spawn(async move {
                let service = service_fn(move |req| {
                    let app = app.clone();
                    let config = config.clone();
                    async move { handle_request(req, app, config, remote_addr).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    error!("Error serving connection: {:?}", err);
                }
            });
        }
    }
}

/// Handle an incoming HTTP request.
async fn handle_request(
    req: Request<Incoming>,
    app: Arc<FunctionApp>,
    config: Arc<FrameworkConfig>,
    remote_addr: SocketAddr,
) -> Result<Response<Full<Bytes>>, Infallible> {
    debug!("Handling request: {} {} from {}", req.method(), req.uri(), remote_addr);

    let request = match convert_request(req, config.max_body_size).await {
        Ok(request) => request,
        Err(err) => return Ok(build_response(error_response(app.kind(), &err))),
    };
    Ok(build_response(
        respond(app.clone(), request, config.request_timeout).await,
    ))
}

/// Run the app on a request, enforcing the timeout when it is non-zero.
///
/// The request runs on its own task so the timer is polled even while a
/// blocking function holds its worker thread in place.
pub async fn respond(app: Arc<FunctionApp>, request: FunctionRequest, timeout: u64) -> FunctionResponse {
    if timeout == 0 {
        return app.handle(request).await;
    }
    let kind = app.kind();
    let mut task = tokio::spawn(async move { app.handle(request).await });
    match tokio::time::timeout(Duration::from_secs(timeout), &mut task).await {
        Ok(Ok(response)) => response,
        Ok(Err(err)) => error_response(
            kind,
            &RequestError::Handler(FunctionError::new(err.to_string())),
        ),
        Err(_) => {
            task.abort();
            error_response(kind, &RequestError::Timeout { seconds: timeout })
        }
    }
}

/// Read a hyper request to completion.
async fn convert_request(
    req: Request<Incoming>,
    max_body_size: usize,
) -> Result<FunctionRequest, RequestError> {
    let (parts, body) = req.into_parts();
    let mut request = FunctionRequest::new(Method::from(&parts.method), parts.uri.path());
    if let Some(query) = parts.uri.query() {
        request = request.query(query);
    }
    for (name, value) in &parts.headers {
        match value.to_str() {
            Ok(v) => request.set_header(name.as_str(), v),
            Err(_) => warn!("Dropping non-ASCII header {}", name),
        }
    }

    let body = Limited::new(body, max_body_size)
        .collect()
        .await
        .map_err(|err| {
            if err.downcast_ref::<LengthLimitError>().is_some() {
                RequestError::BodyTooLarge {
                    limit: max_body_size,
                }
            } else {
                RequestError::InvalidEvent(format!("failed to read request body: {}", err))
            }
        })?
        .to_bytes();
    if !body.is_empty() {
        request = request.body(body);
    }
    Ok(request)
}

/// Build a hyper Response from a FunctionResponse.
fn build_response(response: FunctionResponse) -> Response<Full<Bytes>> {
    let status = hyper::StatusCode::from_u16(response.status.0).unwrap_or_else(|_| {
        warn!(
            "Invalid status code {}, falling back to 500 Internal Server Error",
            response.status.0
        );
        hyper::StatusCode::INTERNAL_SERVER_ERROR
    });

    let mut builder = Response::builder().status(status);
    for (name, value) in response.headers {
        builder = builder.header(name, value);
    }

    let body = response.body.unwrap_or_default();
    builder.body(Full::new(body)).unwrap_or_else(|err| {
        error!("Failed to build response: {}", err);
        let mut fallback = Response::new(Full::new(Bytes::from_static(b"Internal Server Error")));
        *fallback.status_mut() = hyper::StatusCode::INTERNAL_SERVER_ERROR;
        fallback
    })
}
