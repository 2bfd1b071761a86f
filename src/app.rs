use std::{any::Any, future::Future, net::SocketAddr, time::Duration};

use anyhow::Context;
use axum::{
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::{net::TcpListener, sync::oneshot};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::CorsLayer,
    timeout::{RequestBodyTimeoutLayer, TimeoutLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::{error::AppError, state::AppState, users};

pub fn build_app(state: AppState, request_timeout: Duration) -> Router {
    let routes = Router::new()
        .merge(users::router())
        .route("/health", get(|| async { "ok" }))
        .with_state(state);
    apply_layers(routes, request_timeout)
}

/// Panics become a 500 envelope; slow handlers or bodies get a 408.
fn apply_layers(router: Router, request_timeout: Duration) -> Router {
    router
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(RequestBodyTimeoutLayer::new(request_timeout))
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: Duration, span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, ?latency, "response");
                        } else {
                            tracing::info!(%status, ?latency, "response");
                        }
                    },
                ),
        )
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "<unknown>".into()
    };
    AppError::Internal(anyhow::anyhow!("handler panicked: {detail}")).into_response()
}

/// How the server came down after the stop signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    Drained,
    Aborted,
}

/// Serves until SIGINT/SIGTERM, then gives in-flight requests `grace` to finish.
pub async fn serve(app: Router, addr: SocketAddr, grace: Duration) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    info!("listening on {}", addr);

    serve_until(listener, app, shutdown_signal(), grace).await?;
    Ok(())
}

/// Runs `app` until `signal` resolves. Connections still open once `grace`
/// has passed are abandoned and the server task is aborted.
pub async fn serve_until<F>(
    listener: TcpListener,
    app: Router,
    signal: F,
    grace: Duration,
) -> anyhow::Result<ShutdownOutcome>
where
    F: Future<Output = ()>,
{
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = stop_rx.await;
            })
            .await
    });

    signal.await;
    info!("shutdown signal received, draining connections");
    let _ = stop_tx.send(());

    match tokio::time::timeout(grace, &mut server).await {
        Ok(joined) => {
            joined??;
            Ok(ShutdownOutcome::Drained)
        }
        Err(_) => {
            warn!(?grace, "grace period elapsed with requests still in flight, aborting");
            server.abort();
            let _ = server.await;
            Ok(ShutdownOutcome::Aborted)
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body, Bytes},
        http::{Request, StatusCode},
    };
    use serde_json::Value;
    use tokio::{io::AsyncWriteExt, net::TcpStream, sync::Notify};
    use tower::ServiceExt;

    use super::*;

    async fn get_path(app: Router, uri: &str) -> (StatusCode, Bytes) {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        (status, to_bytes(resp.into_body(), 1024).await.unwrap())
    }

    #[tokio::test]
    async fn health_is_public() {
        let app = build_app(AppState::fake(), Duration::from_secs(30));
        let (status, body) = get_path(app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"ok");
    }

    async fn explode() -> &'static str {
        panic!("handler blew up")
    }

    #[tokio::test]
    async fn panicking_handler_returns_error_envelope() {
        let app = apply_layers(Router::new().route("/boom", get(explode)), Duration::from_secs(30));
        let (status, body) = get_path(app.clone(), "/boom").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["status"], "Error");
        assert_eq!(body["error"], "internal error");

        // the router keeps serving after a panic
        let (status, _) = get_path(app, "/boom").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    async fn dawdle() -> &'static str {
        tokio::time::sleep(Duration::from_secs(5)).await;
        "late"
    }

    #[tokio::test]
    async fn slow_handler_times_out() {
        let app = apply_layers(
            Router::new().route("/slow", get(dawdle)),
            Duration::from_millis(50),
        );
        let (status, _) = get_path(app, "/slow").await;
        assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
    }

    async fn local_listener() -> (TcpListener, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, addr)
    }

    #[tokio::test]
    async fn idle_server_drains_on_signal() {
        let (listener, _) = local_listener().await;
        let app = Router::new().route("/health", get(|| async { "ok" }));
        let outcome = serve_until(listener, app, async {}, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(outcome, ShutdownOutcome::Drained);
    }

    #[tokio::test]
    async fn stuck_request_is_aborted_after_grace() {
        let entered = Arc::new(Notify::new());
        let app = Router::new().route(
            "/stuck",
            get({
                let entered = entered.clone();
                move || {
                    let entered = entered.clone();
                    async move {
                        entered.notify_one();
                        tokio::time::sleep(Duration::from_secs(30)).await;
                        "late"
                    }
                }
            }),
        );

        let (listener, addr) = local_listener().await;
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(serve_until(
            listener,
            app,
            async {
                let _ = stop_rx.await;
            },
            Duration::from_millis(100),
        ));

        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"GET /stuck HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();
        entered.notified().await;
        stop_tx.send(()).unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("shutdown must not wait for the stuck handler")
            .unwrap()
            .unwrap();
        assert_eq!(outcome, ShutdownOutcome::Aborted);
        drop(client);
    }
}
