use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};
use crate::api::{QueryResult, RagApi};
use crate::error::{RequestError, RequestResult};
use crate::session::{DisplayMode, Session};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

pub struct App {
    pub should_quit: bool,
    pub input_mode: InputMode,
    pub session: Session,
    pub client: Arc<dyn RagApi>,

    // Busy guard: at most one query in flight
    pub query_task: Option<JoinHandle<RequestResult<QueryResult>>>,

    // Presentation state
    pub sources_expanded: bool,
    pub animation_frame: u8, // 0-2 for ellipsis animation
    pub scroll: u16,
    pub follow_bottom: bool,
    pub content_height: u16, // updated during render
    pub total_content_lines: u16,
}

impl App {
    pub fn new(client: Arc<dyn RagApi>, mode: DisplayMode) -> Self {
        Self {
            should_quit: false,
            input_mode: InputMode::Editing,
            session: Session::new(mode),
            client,
            query_task: None,
            sources_expanded: false,
            animation_frame: 0,
            scroll: 0,
            follow_bottom: true,
            content_height: 0,
            total_content_lines: 0,
        }
    }

    /// Send the current input as a question. Returns false when nothing was
    /// sent (blank input or a query already running).
    pub fn submit(&mut self) -> bool {
        if self.query_task.is_some() {
            return false;
        }
        let Some(question) = self.session.begin_submit() else {
            return false;
        };

        info!(chars = question.chars().count(), "submitting question");
        self.follow_bottom = true;

        let client = Arc::clone(&self.client);
        self.query_task = Some(tokio::spawn(async move {
            client.send_query(&question).await
        }));
        true
    }

    /// Apply the result of the in-flight query if it has finished.
    pub async fn poll_query_task(&mut self) {
        let finished = self
            .query_task
            .as_ref()
            .map(|task| task.is_finished())
            .unwrap_or(false);
        if !finished {
            return;
        }

        if let Some(task) = self.query_task.take() {
            // A panicked task still has to release the busy flag.
            let outcome = task.await.unwrap_or_else(|join_err| {
                error!(error = %join_err, "query task did not complete");
                Err(RequestError::failed("/query", join_err))
            });
            self.session.complete(outcome);
            self.animation_frame = 0;
        }
    }

    pub fn tick_animation(&mut self) {
        if self.session.is_loading() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    pub fn toggle_sources(&mut self) {
        self.sources_expanded = !self.sources_expanded;
    }

    pub fn max_scroll(&self) -> u16 {
        self.total_content_lines.saturating_sub(self.content_height)
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.follow_bottom = false;
        self.scroll = self.scroll.min(self.max_scroll()).saturating_sub(lines);
    }

    pub fn scroll_down(&mut self, lines: u16) {
        self.scroll = self.scroll.saturating_add(lines).min(self.max_scroll());
        if self.scroll >= self.max_scroll() {
            self.follow_bottom = true;
        }
    }

    pub fn page_size(&self) -> u16 {
        (self.content_height / 2).max(1)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::session::{Role, CHAT_ERROR_MESSAGE};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    pub(crate) enum Reply {
        Answer(QueryResult),
        Fail,
        Panic,
    }

    /// In-memory backend that answers every question the same way.
    pub(crate) struct MockBackend {
        reply: Reply,
        gate: Option<Arc<Notify>>,
        pub calls: AtomicUsize,
    }

    impl MockBackend {
        pub(crate) fn new(reply: Reply) -> Self {
            Self { reply, gate: None, calls: AtomicUsize::new(0) }
        }

        fn gated(reply: Reply, gate: Arc<Notify>) -> Self {
            Self { reply, gate: Some(gate), calls: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl RagApi for MockBackend {
        async fn send_query(&self, _question: &str) -> RequestResult<QueryResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            match &self.reply {
                Reply::Answer(result) => Ok(result.clone()),
                Reply::Fail => Err(RequestError::failed("/query", "connection refused")),
                Reply::Panic => panic!("backend exploded"),
            }
        }

        async fn add_texts(&self, _texts: Vec<String>) -> RequestResult<Value> {
            Ok(Value::Null)
        }

        async fn add_document(&self, _title: &str, _content: &str) -> RequestResult<Value> {
            Ok(Value::Null)
        }

        async fn sync_database(&self) -> RequestResult<Value> {
            Ok(Value::Null)
        }

        async fn get_queries(&self) -> RequestResult<Value> {
            Ok(Value::Null)
        }

        async fn get_document_count(&self) -> RequestResult<Value> {
            Ok(Value::Null)
        }
    }

    pub(crate) fn tomato() -> QueryResult {
        QueryResult {
            answer: "R$5,00".to_string(),
            sources: vec!["doc1".to_string()],
        }
    }

    async fn settle(app: &mut App) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while app.query_task.is_some() {
                app.poll_query_task().await;
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("query task never finished");
    }

    #[tokio::test]
    async fn successful_query_appends_user_and_bot_messages() {
        let backend = Arc::new(MockBackend::new(Reply::Answer(tomato())));
        let mut app = App::new(backend.clone(), DisplayMode::Chat);
        app.session.set_input("Quanto custa o tomate?");

        assert!(app.submit());
        assert!(app.session.is_loading());
        settle(&mut app).await;

        assert!(!app.session.is_loading());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        let messages = app.session.transcript().unwrap().messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].text, "Quanto custa o tomate?");
        assert_eq!(messages[1].text, "R$5,00");
        assert_eq!(messages[1].sources, vec!["doc1".to_string()]);
    }

    #[tokio::test]
    async fn blank_input_never_reaches_the_backend() {
        let backend = Arc::new(MockBackend::new(Reply::Answer(tomato())));
        let mut app = App::new(backend.clone(), DisplayMode::Chat);
        app.session.set_input("   ");

        assert!(!app.submit());
        assert!(app.query_task.is_none());
        assert!(!app.session.is_loading());
        assert!(app.session.transcript().unwrap().is_empty());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rejected_request_becomes_error_message() {
        let backend = Arc::new(MockBackend::new(Reply::Fail));
        let mut app = App::new(backend, DisplayMode::Chat);
        app.session.set_input("oi");

        app.submit();
        settle(&mut app).await;

        let messages = app.session.transcript().unwrap().messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].text, CHAT_ERROR_MESSAGE);
        assert!(messages[1].is_error);
        assert!(messages[1].sources.is_empty());
        assert!(!app.session.is_loading());
    }

    #[tokio::test]
    async fn panicking_task_still_clears_loading() {
        let backend = Arc::new(MockBackend::new(Reply::Panic));
        let mut app = App::new(backend, DisplayMode::Chat);
        app.session.set_input("oi");

        app.submit();
        settle(&mut app).await;

        assert!(!app.session.is_loading());
        let messages = app.session.transcript().unwrap().messages();
        assert!(messages[1].is_error);
    }

    #[tokio::test]
    async fn loading_spans_exactly_the_request() {
        let gate = Arc::new(Notify::new());
        let backend = Arc::new(MockBackend::gated(Reply::Answer(tomato()), gate.clone()));
        let mut app = App::new(backend.clone(), DisplayMode::Chat);

        assert!(!app.session.is_loading());
        app.session.set_input("primeira");
        app.submit();

        for _ in 0..5 {
            tokio::task::yield_now().await;
            app.poll_query_task().await;
            assert!(app.session.is_loading());
        }

        // A second submit while busy is refused.
        app.session.set_input("segunda");
        assert!(!app.submit());
        assert_eq!(app.session.transcript().unwrap().len(), 1);

        gate.notify_one();
        settle(&mut app).await;
        assert!(!app.session.is_loading());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn scrolling_is_clamped() {
        let backend = Arc::new(MockBackend::new(Reply::Fail));
        let mut app = App::new(backend, DisplayMode::Chat);
        app.content_height = 10;
        app.total_content_lines = 25;

        app.scroll_down(100);
        assert_eq!(app.scroll, 15);
        assert!(app.follow_bottom);

        app.scroll_up(4);
        assert_eq!(app.scroll, 11);
        assert!(!app.follow_bottom);

        app.scroll_up(100);
        assert_eq!(app.scroll, 0);
    }
}
