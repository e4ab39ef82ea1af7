use tokio::task::JoinHandle;
use tracing::warn;
use crate::api::ChatClient;

/// Seeded assistant turn shown on startup.
pub const GREETING: &str = "Hi there! I'm your personal chatbot. Ask me anything!";

/// The single user-visible failure message. Transport errors, bad statuses,
/// and malformed payloads all collapse into this turn.
pub const FALLBACK_REPLY: &str = "Sorry, I had trouble responding. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub text: String,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

pub struct App {
    pub should_quit: bool,
    pub input_mode: InputMode,

    // Conversation state
    pub turns: Vec<ChatTurn>,
    pub draft: String,
    pub draft_cursor: usize, // cursor position in draft, in chars
    pub awaiting_reply: bool,
    pub reply_task: Option<JoinHandle<anyhow::Result<String>>>,

    // Chat pane state
    pub chat_scroll: u16,
    pub chat_height: u16, // inner height, updated during render
    pub chat_width: u16,  // inner width, updated during render

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    pub client: ChatClient,
}

impl App {
    pub fn new(client: ChatClient) -> Self {
        Self {
            should_quit: false,
            input_mode: InputMode::Editing,

            turns: vec![ChatTurn::assistant(GREETING)],
            draft: String::new(),
            draft_cursor: 0,
            awaiting_reply: false,
            reply_task: None,

            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,

            animation_frame: 0,

            client,
        }
    }

    /// Submit the current draft. Ignored while a reply is outstanding or when
    /// the draft trims to empty; otherwise the trimmed text becomes a user
    /// turn and one request is spawned against the chat endpoint.
    pub fn submit(&mut self) {
        if self.awaiting_reply {
            return;
        }

        let message = self.draft.trim().to_string();
        if message.is_empty() {
            return;
        }

        self.turns.push(ChatTurn::user(message.clone()));
        self.draft.clear();
        self.draft_cursor = 0;
        self.awaiting_reply = true;
        self.scroll_chat_to_bottom();

        let client = self.client.clone();
        self.reply_task = Some(tokio::spawn(async move {
            client.send_message(&message).await
        }));
    }

    /// Fold a finished exchange into the conversation. Appends the reply on
    /// success and the fixed fallback turn on any failure; clearing
    /// `awaiting_reply` is the last step on every path.
    pub async fn poll_reply(&mut self) {
        let finished = self
            .reply_task
            .as_ref()
            .is_some_and(|task| task.is_finished());
        if !finished {
            return;
        }

        if let Some(task) = self.reply_task.take() {
            let turn = match task.await {
                Ok(Ok(reply)) => ChatTurn::assistant(reply),
                Ok(Err(err)) => {
                    warn!("chat exchange failed: {:#}", err);
                    ChatTurn::assistant(FALLBACK_REPLY)
                }
                Err(err) => {
                    warn!("chat exchange task panicked: {}", err);
                    ChatTurn::assistant(FALLBACK_REPLY)
                }
            };
            self.turns.push(turn);
            self.scroll_chat_to_bottom();
            self.awaiting_reply = false;
        }
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.awaiting_reply {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    pub fn scroll_chat_up(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_sub(1);
    }

    pub fn scroll_chat_down(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_add(1);
    }

    pub fn scroll_chat_to_top(&mut self) {
        self.chat_scroll = 0;
    }

    /// Scroll so the newest turn (and the typing indicator) is visible.
    pub fn scroll_chat_to_bottom(&mut self) {
        // Use actual chat width for wrap calculation, default to 50 if not set
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total_lines: u16 = 0;

        for turn in &self.turns {
            total_lines += 1; // Sender label line ("You:" or "Bot:")
            for line in turn.text.lines() {
                // Use character count, not byte length, for proper UTF-8 handling
                let char_count = line.chars().count();
                if char_count == 0 {
                    total_lines += 1; // Empty line still takes one line
                } else {
                    total_lines += ((char_count / wrap_width) + 1) as u16;
                }
            }
            total_lines += 1; // Blank line after turn
        }

        // Room for the typing indicator rows
        total_lines += 2;

        let visible_height = if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        };

        if total_lines > visible_height {
            self.chat_scroll = total_lines.saturating_sub(visible_height);
        } else {
            self.chat_scroll = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn app_for(server: &MockServer) -> App {
        App::new(ChatClient::new(&format!("{}/api/chat", server.uri())))
    }

    async fn mount_reply(server: &MockServer, template: ResponseTemplate, expected: u64) {
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(template)
            .expect(expected)
            .mount(server)
            .await;
    }

    async fn wait_for_reply(app: &mut App) {
        for _ in 0..500 {
            app.poll_reply().await;
            if !app.awaiting_reply {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("reply never arrived");
    }

    #[tokio::test]
    async fn seed_state_is_one_greeting_turn() {
        let app = App::new(ChatClient::new("http://127.0.0.1:9/api/chat"));

        assert_eq!(app.turns.len(), 1);
        assert_eq!(app.turns[0].role, ChatRole::Assistant);
        assert_eq!(app.turns[0].text, GREETING);
        assert!(app.draft.is_empty());
        assert!(!app.awaiting_reply);
    }

    #[tokio::test]
    async fn whitespace_draft_is_not_submitted() {
        let mut app = App::new(ChatClient::new("http://127.0.0.1:9/api/chat"));
        app.draft = "   \t ".to_string();

        app.submit();

        assert_eq!(app.turns.len(), 1);
        assert!(!app.awaiting_reply);
        assert!(app.reply_task.is_none());
    }

    #[tokio::test]
    async fn draft_is_trimmed_and_cleared_on_submit() {
        let server = MockServer::start().await;
        mount_reply(
            &server,
            ResponseTemplate::new(200)
                .set_body_json(json!({ "response": "Hello!" }))
                .set_delay(Duration::from_millis(100)),
            1,
        )
        .await;

        let mut app = app_for(&server);
        app.draft = "  Hi  ".to_string();
        app.draft_cursor = 6;

        app.submit();

        // Cleared immediately, before the exchange resolves.
        assert!(app.draft.is_empty());
        assert_eq!(app.draft_cursor, 0);
        assert!(app.awaiting_reply);
        assert_eq!(app.turns.last().map(|t| t.text.as_str()), Some("Hi"));
        assert_eq!(app.turns.last().map(|t| t.role), Some(ChatRole::User));

        wait_for_reply(&mut app).await;
    }

    #[tokio::test]
    async fn submit_while_awaiting_is_dropped() {
        let server = MockServer::start().await;
        // expect(1): a second request would fail verification on drop.
        mount_reply(
            &server,
            ResponseTemplate::new(200)
                .set_body_json(json!({ "response": "Hello!" }))
                .set_delay(Duration::from_millis(100)),
            1,
        )
        .await;

        let mut app = app_for(&server);
        app.draft = "Hi".to_string();
        app.submit();

        app.draft = "again".to_string();
        app.submit();

        // Sequence unchanged, draft untouched by the dropped submission.
        assert_eq!(app.turns.len(), 2);
        assert_eq!(app.draft, "again");

        wait_for_reply(&mut app).await;
        assert_eq!(app.turns.len(), 3);
    }

    #[tokio::test]
    async fn successful_exchange_appends_reply() {
        let server = MockServer::start().await;
        mount_reply(
            &server,
            ResponseTemplate::new(200).set_body_json(json!({ "response": "Hello!" })),
            1,
        )
        .await;

        let mut app = app_for(&server);
        app.draft = "Hi".to_string();
        app.submit();
        wait_for_reply(&mut app).await;

        let tail: Vec<_> = app
            .turns
            .iter()
            .rev()
            .take(2)
            .map(|t| (t.role, t.text.as_str()))
            .collect();
        assert_eq!(
            tail,
            vec![(ChatRole::Assistant, "Hello!"), (ChatRole::User, "Hi")]
        );
        assert!(!app.awaiting_reply);
        assert!(app.reply_task.is_none());
    }

    #[tokio::test]
    async fn server_error_appends_fallback() {
        let server = MockServer::start().await;
        mount_reply(&server, ResponseTemplate::new(500), 1).await;

        let mut app = app_for(&server);
        app.draft = "Hi".to_string();
        app.submit();
        wait_for_reply(&mut app).await;

        assert_eq!(
            app.turns.last().map(|t| t.text.as_str()),
            Some(FALLBACK_REPLY)
        );
        assert_eq!(app.turns.last().map(|t| t.role), Some(ChatRole::Assistant));
        assert!(!app.awaiting_reply);
    }

    #[tokio::test]
    async fn malformed_payload_appends_fallback() {
        let server = MockServer::start().await;
        mount_reply(
            &server,
            ResponseTemplate::new(200).set_body_json(json!({ "reply": "Hello!" })),
            1,
        )
        .await;

        let mut app = app_for(&server);
        app.draft = "Hi".to_string();
        app.submit();
        wait_for_reply(&mut app).await;

        assert_eq!(
            app.turns.last().map(|t| t.text.as_str()),
            Some(FALLBACK_REPLY)
        );
        assert!(!app.awaiting_reply);
    }

    #[tokio::test]
    async fn connection_failure_appends_fallback() {
        let mut app = App::new(ChatClient::new("http://127.0.0.1:9/api/chat"));
        app.draft = "Hi".to_string();
        app.submit();
        wait_for_reply(&mut app).await;

        assert_eq!(
            app.turns.last().map(|t| t.text.as_str()),
            Some(FALLBACK_REPLY)
        );
        assert!(!app.awaiting_reply);
    }

    #[tokio::test]
    async fn conversation_stays_usable_after_failure() {
        let server = MockServer::start().await;
        mount_reply(
            &server,
            ResponseTemplate::new(200).set_body_json(json!({ "response": "Hello!" })),
            1,
        )
        .await;

        // First exchange fails against a dead endpoint.
        let mut app = App::new(ChatClient::new("http://127.0.0.1:9/api/chat"));
        app.draft = "Hi".to_string();
        app.submit();
        wait_for_reply(&mut app).await;

        // Second exchange succeeds against the mock.
        app.client = ChatClient::new(&format!("{}/api/chat", server.uri()));
        app.draft = "Hi again".to_string();
        app.submit();
        wait_for_reply(&mut app).await;

        assert_eq!(app.turns.last().map(|t| t.text.as_str()), Some("Hello!"));
    }

    #[tokio::test]
    async fn animation_only_advances_while_awaiting() {
        let mut app = App::new(ChatClient::new("http://127.0.0.1:9/api/chat"));

        app.tick_animation();
        assert_eq!(app.animation_frame, 0);

        app.awaiting_reply = true;
        app.tick_animation();
        assert_eq!(app.animation_frame, 1);
        app.tick_animation();
        app.tick_animation();
        assert_eq!(app.animation_frame, 0);
    }
}
