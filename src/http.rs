//! Shared outbound HTTP client construction

use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use std::time::Duration;

use crate::{OpenglideError, Result};

/// Both OSM services ask clients to identify themselves.
pub const USER_AGENT: &str = concat!(
    "openglide/",
    env!("CARGO_PKG_VERSION"),
    " (https://openglide.club)"
);

/// Client that retries transient failures (timeouts, 429, 5xx) with backoff
pub fn build_client(timeout: Duration, max_retries: u32) -> Result<ClientWithMiddleware> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| OpenglideError::config(format!("Failed to create HTTP client: {e}")))?;

    let retry_policy = ExponentialBackoff::builder().build_with_max_retries(max_retries);

    Ok(ClientBuilder::new(client)
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .build())
}

#[cfg(test)]
pub(crate) mod testing {
    use axum::{
        Router,
        extract::{RawQuery, State},
        http::StatusCode,
        routing::get,
    };
    use std::sync::{Arc, Mutex};

    /// Raw query strings received by a stub upstream
    pub(crate) type Seen = Arc<Mutex<Vec<String>>>;

    /// Answer every GET on `path` with `status` and `body`; returns the base URL
    pub(crate) async fn serve_stub(
        path: &str,
        status: StatusCode,
        body: &'static str,
    ) -> (String, Seen) {
        let seen = Seen::default();
        let app = Router::new()
            .route(
                path,
                get(
                    move |State(seen): State<Seen>, RawQuery(query): RawQuery| async move {
                        seen.lock().unwrap().push(query.unwrap_or_default());
                        (status, body)
                    },
                ),
            )
            .with_state(seen.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        (format!("http://{addr}"), seen)
    }
}
