use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use crate::error::{RequestError, RequestResult};

const QUERY: &str = "/query";
const ADD_DOCUMENTS: &str = "/add-documents";
const DOCUMENTS: &str = "/documents";
const SYNC_DATABASE: &str = "/sync-database";
const QUERIES: &str = "/queries";
const DOCUMENT_COUNT: &str = "/documents/count";

/// Answer to one question, with the identifiers of the sources it cites.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueryResult {
    pub answer: String,
    pub sources: Vec<String>,
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    question: &'a str,
}

#[derive(Deserialize)]
struct QueryResponse {
    answer: String,
    // Absent and null both mean "no sources".
    #[serde(default)]
    sources: Option<Vec<String>>,
}

#[derive(Serialize)]
struct AddDocumentsRequest {
    texts: Vec<String>,
    metadatas: Option<Value>,
}

#[derive(Serialize)]
struct DocumentRequest<'a> {
    title: &'a str,
    content: &'a str,
}

/// Everything the front end can ask of the RAG backend.
///
/// Responses other than `/query` are never interpreted and come back as raw
/// JSON.
#[async_trait]
pub trait RagApi: Send + Sync {
    async fn send_query(&self, question: &str) -> RequestResult<QueryResult>;
    async fn add_texts(&self, texts: Vec<String>) -> RequestResult<Value>;
    async fn add_document(&self, title: &str, content: &str) -> RequestResult<Value>;
    async fn sync_database(&self) -> RequestResult<Value>;
    async fn get_queries(&self) -> RequestResult<Value>;
    async fn get_document_count(&self) -> RequestResult<Value>;
}

#[derive(Clone)]
pub struct RagClient {
    client: Client,
    base_url: String,
}

impl RagClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        request: RequestBuilder,
    ) -> RequestResult<T> {
        debug!(endpoint, "sending request");

        let response = request
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| failure(endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(failure(endpoint, format!("status {}", status)));
        }

        response.json::<T>().await.map_err(|e| failure(endpoint, e))
    }
}

fn failure(endpoint: &'static str, reason: impl ToString) -> RequestError {
    let err = RequestError::failed(endpoint, reason);
    warn!(error = %err, "backend request failed");
    err
}

#[async_trait]
impl RagApi for RagClient {
    async fn send_query(&self, question: &str) -> RequestResult<QueryResult> {
        let request = self.client.post(self.url(QUERY)).json(&QueryRequest { question });
        let response: QueryResponse = self.execute(QUERY, request).await?;

        Ok(QueryResult {
            answer: response.answer,
            sources: response.sources.unwrap_or_default(),
        })
    }

    async fn add_texts(&self, texts: Vec<String>) -> RequestResult<Value> {
        let body = AddDocumentsRequest { texts, metadatas: None };
        let request = self.client.post(self.url(ADD_DOCUMENTS)).json(&body);
        self.execute(ADD_DOCUMENTS, request).await
    }

    async fn add_document(&self, title: &str, content: &str) -> RequestResult<Value> {
        let request = self
            .client
            .post(self.url(DOCUMENTS))
            .json(&DocumentRequest { title, content });
        self.execute(DOCUMENTS, request).await
    }

    async fn sync_database(&self) -> RequestResult<Value> {
        let request = self
            .client
            .post(self.url(SYNC_DATABASE))
            .header(header::CONTENT_TYPE, "application/json");
        self.execute(SYNC_DATABASE, request).await
    }

    async fn get_queries(&self) -> RequestResult<Value> {
        let request = self.client.get(self.url(QUERIES));
        self.execute(QUERIES, request).await
    }

    async fn get_document_count(&self) -> RequestResult<Value> {
        let request = self.client.get(self.url(DOCUMENT_COUNT));
        self.execute(DOCUMENT_COUNT, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    type Seen = Arc<Mutex<Vec<Value>>>;

    async fn spawn_backend(api: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().nest("/api/v1", api);
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/api/v1", addr)
    }

    fn recording(seen: &Seen, reply: Value) -> axum::routing::MethodRouter {
        let seen = seen.clone();
        post(move |Json(body): Json<Value>| {
            let seen = seen.clone();
            let reply = reply.clone();
            async move {
                seen.lock().unwrap().push(body);
                Json(reply)
            }
        })
    }

    #[tokio::test]
    async fn send_query_posts_question_and_decodes_answer() {
        let seen: Seen = Arc::default();
        let reply = json!({"answer": "R$5,00", "sources": ["doc1"], "data": [{"preco": 5}]});
        let base = spawn_backend(Router::new().route("/query", recording(&seen, reply))).await;

        let client = RagClient::new(&base);
        let result = client.send_query("Quanto custa o tomate?").await.unwrap();

        assert_eq!(result.answer, "R$5,00");
        assert_eq!(result.sources, vec!["doc1".to_string()]);
        assert_eq!(seen.lock().unwrap()[0], json!({"question": "Quanto custa o tomate?"}));
    }

    #[tokio::test]
    async fn missing_or_null_sources_decode_as_empty() {
        let api = Router::new()
            .route("/query", post(|| async { Json(json!({"answer": "sem fontes"})) }));
        let base = spawn_backend(api).await;
        let result = RagClient::new(&base).send_query("x").await.unwrap();
        assert!(result.sources.is_empty());

        let api = Router::new()
            .route("/query", post(|| async { Json(json!({"answer": "nulo", "sources": null})) }));
        let base = spawn_backend(api).await;
        let result = RagClient::new(&base).send_query("x").await.unwrap();
        assert_eq!(result.answer, "nulo");
        assert!(result.sources.is_empty());
    }

    #[tokio::test]
    async fn trailing_slash_in_base_url_is_ignored() {
        let api = Router::new().route("/documents/count", get(|| async { Json(json!({"count": 7})) }));
        let base = spawn_backend(api).await;

        let client = RagClient::new(&format!("{}/", base));
        assert_eq!(client.base_url(), base);
        assert_eq!(client.get_document_count().await.unwrap(), json!({"count": 7}));
    }

    #[tokio::test]
    async fn add_texts_sends_texts_with_null_metadata() {
        let seen: Seen = Arc::default();
        let api = Router::new().route("/add-documents", recording(&seen, json!({"added": 1})));
        let base = spawn_backend(api).await;

        let response = RagClient::new(&base)
            .add_texts(vec!["Tomate custa R$5,00".to_string()])
            .await
            .unwrap();

        assert_eq!(response, json!({"added": 1}));
        assert_eq!(
            seen.lock().unwrap()[0],
            json!({"texts": ["Tomate custa R$5,00"], "metadatas": null})
        );
    }

    #[tokio::test]
    async fn add_document_sends_title_and_content() {
        let seen: Seen = Arc::default();
        let api = Router::new().route("/documents", recording(&seen, json!({"id": 3})));
        let base = spawn_backend(api).await;

        let response = RagClient::new(&base)
            .add_document("Preços", "Tomate: R$5,00")
            .await
            .unwrap();

        assert_eq!(response, json!({"id": 3}));
        assert_eq!(
            seen.lock().unwrap()[0],
            json!({"title": "Preços", "content": "Tomate: R$5,00"})
        );
    }

    #[tokio::test]
    async fn parameterless_endpoints_pass_json_through() {
        let api = Router::new()
            .route("/sync-database", post(|| async { Json(json!({"synced": 12})) }))
            .route(
                "/queries",
                get(|| async { Json(json!([{"id": 1, "query_text": "oi", "response": "olá"}])) }),
            );
        let base = spawn_backend(api).await;
        let client = RagClient::new(&base);

        assert_eq!(client.sync_database().await.unwrap(), json!({"synced": 12}));
        assert_eq!(client.get_queries().await.unwrap()[0]["query_text"], "oi");
    }

    #[tokio::test]
    async fn non_success_status_is_request_failed() {
        let api = Router::new().route(
            "/query",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let base = spawn_backend(api).await;

        let err = RagClient::new(&base).send_query("x").await.unwrap_err();
        let RequestError::RequestFailed { endpoint, reason } = err;
        assert_eq!(endpoint, QUERY);
        assert!(reason.contains("500"));
    }

    #[tokio::test]
    async fn undecodable_body_is_request_failed() {
        let api = Router::new().route("/query", post(|| async { "definitely not json" }));
        let base = spawn_backend(api).await;

        assert!(RagClient::new(&base).send_query("x").await.is_err());
    }

    #[tokio::test]
    async fn connection_refused_is_request_failed() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = RagClient::new(&format!("http://{}/api/v1", addr));
        assert!(matches!(
            client.get_queries().await,
            Err(RequestError::RequestFailed { endpoint: QUERIES, .. })
        ));
    }
}
