//! HTTP/1.1 accept loop for the prediction proxy.

use crate::config::{ApiError, ApiResult};
use crate::handlers::{handle, ApiState};
use cedar_pipeline::CancellationToken;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct PredictionServer {
    listener: TcpListener,
    state: Arc<ApiState>,
}

impl PredictionServer {
    pub async fn bind(state: ApiState) -> ApiResult<Self> {
        let addr = state.config.address.clone();
        let listener = TcpListener::bind(&addr).await.map_err(|source| ApiError::Bind { addr, source })?;
        Ok(Self { listener, state: Arc::new(state) })
    }

    pub fn local_addr(&self) -> ApiResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` is cancelled.
    pub async fn serve(self, shutdown: CancellationToken) -> ApiResult<()> {
        tracing::info!(
            addr = %self.local_addr()?,
            endpoint = %self.state.config.endpoint_name,
            "prediction API listening"
        );

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            tracing::debug!(%peer, "new connection");
                            let state = Arc::clone(&self.state);
                            tokio::spawn(async move {
                                let service = service_fn(move |req| {
                                    let state = Arc::clone(&state);
                                    async move { Ok::<_, Infallible>(handle_request(&state, req).await) }
                                });
                                if let Err(e) = http1::Builder::new().serve_connection(TokioIo::new(stream), service).await {
                                    tracing::warn!(%peer, error = %e, "error serving connection");
                                }
                            });
                        }
                        Err(e) => tracing::error!(error = %e, "error accepting connection"),
                    }
                }
                () = shutdown.cancelled() => {
                    tracing::info!("shutdown requested, stopping accept loop");
                    return Ok(());
                }
            }
        }
    }
}

async fn handle_request(state: &ApiState, req: Request<Incoming>) -> Response<Full<Bytes>> {
    let (parts, body) = req.into_parts();
    let body = body.collect().await.map(|b| b.to_bytes()).unwrap_or_default();
    let response = handle(state, &parts.method, parts.uri.path(), parts.uri.query(), &body).await;
    tracing::info!(method = %parts.method, path = parts.uri.path(), status = response.status().as_u16(), "request");
    response
}
