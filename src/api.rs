use reqwest::Client;
use serde::{Deserialize, Serialize};
use anyhow::{Result, anyhow};
use tracing::debug;

#[derive(Serialize)]
struct ChatRequest {
    message: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    response: String,
}

/// HTTP client for the chat-completion endpoint. Cheap to clone; the inner
/// reqwest client shares its connection pool across clones.
#[derive(Clone)]
pub struct ChatClient {
    client: Client,
    endpoint: String,
}

impl ChatClient {
    pub fn new(endpoint: &str) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.to_string(),
        }
    }

    /// Send one user message and return the reply text. Errors on transport
    /// failure, non-success status, or a payload without a `response` field.
    pub async fn send_message(&self, message: &str) -> Result<String> {
        let request = ChatRequest {
            message: message.to_string(),
        };

        debug!("sending chat request to {}", self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "chat request failed with status: {}",
                response.status()
            ));
        }

        let chat_response: ChatResponse = response.json().await?;
        Ok(chat_response.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mock_chat_server(template: ResponseTemplate) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(template)
            .mount(&server)
            .await;
        server
    }

    fn client_for(server: &MockServer) -> ChatClient {
        ChatClient::new(&format!("{}/api/chat", server.uri()))
    }

    #[tokio::test]
    async fn send_message_returns_reply_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_json(json!({ "message": "Hi" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "response": "Hello!" })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let reply = client.send_message("Hi").await.expect("request should succeed");
        assert_eq!(reply, "Hello!");
    }

    #[tokio::test]
    async fn send_message_errors_on_server_failure() {
        let server = mock_chat_server(ResponseTemplate::new(500)).await;

        let client = client_for(&server);
        let result = client.send_message("Hi").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn send_message_errors_on_missing_response_field() {
        let server =
            mock_chat_server(ResponseTemplate::new(200).set_body_json(json!({ "reply": "Hello!" })))
                .await;

        let client = client_for(&server);
        let result = client.send_message("Hi").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn send_message_errors_on_connection_failure() {
        // Nothing is listening here.
        let client = ChatClient::new("http://127.0.0.1:9/api/chat");
        let result = client.send_message("Hi").await;
        assert!(result.is_err());
    }
}
