use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;

use super::NotificationDispatcher;

/// Hands messages to a notification service over HTTP.
pub struct HttpDispatcher {
    url: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct OutgoingMessage<'a> {
    to: &'a str,
    subject: &'a str,
    body: &'a str,
}

impl HttpDispatcher {
    pub fn new(url: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build notification HTTP client")?;
        Ok(Self { url, client })
    }
}

#[async_trait]
impl NotificationDispatcher for HttpDispatcher {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        self.client
            .post(&self.url)
            .json(&OutgoingMessage { to, subject, body })
            .send()
            .await
            .context("failed to reach notification service")?
            .error_for_status()
            .context("notification service returned error")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::Router;

    async fn serve(status: StatusCode) -> String {
        let app = Router::new().route("/notify", post(move || async move { status }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/notify")
    }

    fn dispatcher(url: String) -> HttpDispatcher {
        HttpDispatcher::new(url, Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn test_accepted_message_is_ok() {
        let url = serve(StatusCode::ACCEPTED).await;
        dispatcher(url)
            .send("alice@example.com", "Booking confirmation", "hi")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_error_status_is_err() {
        let url = serve(StatusCode::INTERNAL_SERVER_ERROR).await;
        let err = dispatcher(url)
            .send("alice@example.com", "Booking confirmation", "hi")
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("returned error"));
    }

    #[tokio::test]
    async fn test_unreachable_service_is_err() {
        let addr = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();

        let err = dispatcher(format!("http://{addr}/notify"))
            .send("alice@example.com", "Booking reminder", "hi")
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("failed to reach"));
    }
}
