//! Loopback HTTP listener receiving OAuth redirect callbacks
//!
//! The listener binds `127.0.0.1:<port>` and serves a single route, the
//! configured callback path. Every request on that path is forwarded to the
//! owner as a [`CallbackEvent`]; the owner answers with a
//! [`CallbackReply`] which decides the page shown in the browser tab. Any
//! other path is a 404.
//!
//! The listener is released by [`CallbackListener::shutdown`] and, as a last
//! resort, when dropped.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::types::CallbackParams;

/// Upper bound on waiting for in-flight responses during shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

const SUCCESS_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Authorization Complete</title></head>
<body><h1>Authorization Successful</h1><p>You can close this tab and return to Tabula.</p></body>
</html>"#;

const FAILURE_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Authorization Failed</title></head>
<body><h1>Authorization Failed</h1><p>Sign-in did not complete. Close this tab and try again from Tabula.</p></body>
</html>"#;

/// Page rendered for a callback request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackReply {
    Success,
    Failure,
}

/// A callback request awaiting the owner's verdict.
#[derive(Debug)]
pub struct CallbackEvent {
    /// Query parameters of the redirect.
    pub params: CallbackParams,
    /// Page to send back to the browser.
    pub reply: oneshot::Sender<CallbackReply>,
}

/// Running loopback callback server
pub struct CallbackListener {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for CallbackListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackListener")
            .field("addr", &self.addr)
            .field("running", &self.handle.as_ref().is_some_and(|h| !h.is_finished()))
            .finish()
    }
}

impl CallbackListener {
    /// Bind the listener and start serving.
    ///
    /// # Arguments
    /// * `port` - Loopback port (0 picks an ephemeral port)
    /// * `path` - The only path that accepts callbacks
    ///
    /// # Errors
    /// Returns the bind error, e.g. when the port is already in use.
    pub async fn bind(
        port: u16,
        path: &str,
    ) -> std::io::Result<(Self, mpsc::Receiver<CallbackEvent>)> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port)).await?;
        let addr = listener.local_addr()?;

        let (events_tx, events_rx) = mpsc::channel(4);
        let app = Router::new().route(path, get(handle_callback)).with_state(events_tx);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
            {
                error!(error = %err, "OAuth callback server error");
            }
        });

        debug!(addr = %addr, path = %path, "OAuth callback listener bound");
        Ok((Self { addr, shutdown_tx: Some(shutdown_tx), handle: Some(handle) }, events_rx))
    }

    /// Bound port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Bound loopback address.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting connections and wait until the port is released.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut handle) = self.handle.take() {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut handle).await.is_err() {
                warn!(addr = %self.addr, "Callback listener did not stop in time; aborting");
                handle.abort();
                let _ = handle.await;
            }
        }
        debug!(addr = %self.addr, "OAuth callback listener closed");
    }
}

impl Drop for CallbackListener {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if !handle.is_finished() {
                handle.abort();
            }
        }
    }
}

async fn handle_callback(
    State(events): State<mpsc::Sender<CallbackEvent>>,
    Query(params): Query<CallbackParams>,
) -> (StatusCode, Html<&'static str>) {
    let (reply_tx, reply_rx) = oneshot::channel();
    if events.send(CallbackEvent { params, reply: reply_tx }).await.is_err() {
        return (StatusCode::GONE, Html(FAILURE_PAGE));
    }

    match reply_rx.await {
        Ok(CallbackReply::Success) => (StatusCode::OK, Html(SUCCESS_PAGE)),
        Ok(CallbackReply::Failure) => (StatusCode::BAD_REQUEST, Html(FAILURE_PAGE)),
        Err(_) => (StatusCode::GONE, Html(FAILURE_PAGE)),
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for auth::callback.
    use super::*;

    fn client() -> reqwest::Client {
        reqwest::Client::builder().no_proxy().build().unwrap()
    }

    /// Validates that callbacks are forwarded and the reply selects the page.
    #[tokio::test]
    async fn test_callback_forwarded_and_answered() {
        let (listener, mut events) = CallbackListener::bind(0, "/auth/callback").await.unwrap();
        let url = format!("http://{}/auth/callback?code=abc&state=xyz", listener.local_addr());

        let responder = tokio::spawn(async move {
            let event = events.recv().await.unwrap();
            assert_eq!(event.params.code.as_deref(), Some("abc"));
            assert_eq!(event.params.state.as_deref(), Some("xyz"));
            event.reply.send(CallbackReply::Success).unwrap();
        });

        let response = client().get(&url).send().await.unwrap();
        assert_eq!(response.status(), 200);
        assert!(response.text().await.unwrap().contains("Authorization Successful"));

        responder.await.unwrap();
        listener.shutdown().await;
    }

    /// Validates that other paths return 404 without producing an event.
    #[tokio::test]
    async fn test_unknown_path_is_404() {
        let (listener, mut events) = CallbackListener::bind(0, "/auth/callback").await.unwrap();
        let url = format!("http://{}/favicon.ico", listener.local_addr());

        let response = client().get(&url).send().await.unwrap();
        assert_eq!(response.status(), 404);
        assert!(events.try_recv().is_err());

        listener.shutdown().await;
    }

    /// Validates that shutdown releases the port for rebinding.
    #[tokio::test]
    async fn test_shutdown_releases_port() {
        let (listener, _events) = CallbackListener::bind(0, "/cb").await.unwrap();
        let port = listener.port();
        listener.shutdown().await;

        let (again, _events) = CallbackListener::bind(port, "/cb").await.unwrap();
        assert_eq!(again.port(), port);
        again.shutdown().await;
    }

    /// Validates that a second bind on a busy port fails.
    #[tokio::test]
    async fn test_port_conflict_fails() {
        let (listener, _events) = CallbackListener::bind(0, "/cb").await.unwrap();
        assert!(CallbackListener::bind(listener.port(), "/cb").await.is_err());
        listener.shutdown().await;
    }
}
