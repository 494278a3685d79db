//! Состояние поля ввода сообщения: новое сообщение или правка своего.

use crate::error::{ChatClientError, ChatClientResult};
use crate::models::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Режим поля ввода.
pub enum ComposeMode {
    /// Набор нового сообщения.
    Composing,
    /// Правка сообщения с указанным id.
    Editing(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Что отправить на сервер при submit.
pub enum Submission {
    /// Новое сообщение собеседнику.
    Send {
        /// Получатель.
        to_user_id: i64,
        /// Текст.
        content: String,
    },
    /// Правка существующего сообщения.
    Update {
        /// Идентификатор сообщения.
        message_id: i64,
        /// Новый текст.
        content: String,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
/// Нажатие клавиши в поле ввода.
pub struct KeyPress {
    /// Нажат Enter.
    pub enter: bool,
    /// Зажат Shift.
    pub shift: bool,
    /// Зажат Ctrl.
    pub ctrl: bool,
    /// Зажат Alt.
    pub alt: bool,
}

impl KeyPress {
    /// Просто Enter.
    pub fn enter() -> Self {
        Self {
            enter: true,
            ..Self::default()
        }
    }

    /// Отправляет только Enter без модификаторов; остальные комбинации
    /// оставлены под многострочный ввод.
    pub fn submits(&self) -> bool {
        self.enter && !self.shift && !self.ctrl && !self.alt
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Черновик сообщения.
pub struct ComposeState {
    content: String,
    editing_message_id: Option<i64>,
    pending: bool,
}

impl ComposeState {
    /// Пустой черновик в режиме набора.
    pub fn new() -> Self {
        Self::default()
    }

    /// Текущий текст.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Текущий режим.
    pub fn mode(&self) -> ComposeMode {
        match self.editing_message_id {
            Some(id) => ComposeMode::Editing(id),
            None => ComposeMode::Composing,
        }
    }

    /// Запрос уже в полёте.
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Пользователь печатает: текст меняется, режим нет.
    pub fn input(&mut self, text: impl Into<String>) {
        self.content = text.into();
    }

    /// Внешний сброс черновика. Пустой текст возвращает режим набора.
    pub fn replace_draft(&mut self, text: impl Into<String>) {
        self.content = text.into();
        if self.content.is_empty() {
            self.editing_message_id = None;
        }
    }

    /// Переход к правке своего сообщения; текст подставляется из сообщения.
    pub fn begin_edit(&mut self, message: &Message, current_user_id: i64) -> ChatClientResult<()> {
        if !message.is_authored_by(current_user_id) {
            return Err(ChatClientError::InvalidRequest(format!(
                "message {} belongs to another user",
                message.id
            )));
        }
        self.editing_message_id = Some(message.id);
        self.content = message.content.clone();
        Ok(())
    }

    /// Отмена правки: пустой черновик в режиме набора.
    pub fn cancel_edit(&mut self) {
        self.editing_message_id = None;
        self.content.clear();
    }

    /// Submit доступен: текст не пустой и предыдущий запрос завершён.
    pub fn can_submit(&self) -> bool {
        !self.pending && !self.content.trim().is_empty()
    }

    /// Начинает отправку в переписку с `conversation_user_id`.
    ///
    /// Возвращает `None`, если submit недоступен; иначе помечает черновик
    /// как ожидающий ответа.
    pub fn begin_submit(&mut self, conversation_user_id: i64) -> Option<Submission> {
        if !self.can_submit() {
            return None;
        }
        self.pending = true;

        let content = self.content.clone();
        Some(match self.editing_message_id {
            Some(message_id) => Submission::Update {
                message_id,
                content,
            },
            None => Submission::Send {
                to_user_id: conversation_user_id,
                content,
            },
        })
    }

    /// Завершает отправку. Успех очищает черновик, ошибка сохраняет его
    /// для повтора.
    pub fn finish_submit(&mut self, success: bool) {
        self.pending = false;
        if success {
            self.editing_message_id = None;
            self.content.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ME: i64 = 1;
    const PEER: i64 = 2;

    fn own_message(id: i64, content: &str) -> Message {
        Message {
            id,
            from_user_id: ME,
            to_user_id: PEER,
            content: content.to_string(),
            date: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn new_message_is_sent_to_conversation_peer() {
        let mut compose = ComposeState::new();
        compose.input("hello");

        let submission = compose.begin_submit(PEER).expect("submit enabled");
        assert_eq!(
            submission,
            Submission::Send {
                to_user_id: PEER,
                content: "hello".to_string()
            }
        );
        assert!(compose.is_pending());
        assert!(!compose.can_submit());

        compose.finish_submit(true);
        assert_eq!(compose.content(), "");
        assert_eq!(compose.mode(), ComposeMode::Composing);
    }

    #[test]
    fn edit_prefills_then_clears_after_update() {
        let mut compose = ComposeState::new();
        compose
            .begin_edit(&own_message(42, "old text"), ME)
            .expect("own message");
        assert_eq!(compose.mode(), ComposeMode::Editing(42));
        assert_eq!(compose.content(), "old text");

        compose.input("new text");
        let submission = compose.begin_submit(PEER).expect("submit enabled");
        assert_eq!(
            submission,
            Submission::Update {
                message_id: 42,
                content: "new text".to_string()
            }
        );

        compose.finish_submit(true);
        assert_eq!(compose.mode(), ComposeMode::Composing);
        assert_eq!(compose.content(), "");
    }

    #[test]
    fn foreign_message_cannot_be_edited() {
        let mut compose = ComposeState::new();
        let foreign = Message {
            from_user_id: PEER,
            to_user_id: ME,
            ..own_message(5, "theirs")
        };
        assert!(compose.begin_edit(&foreign, ME).is_err());
        assert_eq!(compose.mode(), ComposeMode::Composing);
        assert_eq!(compose.content(), "");
    }

    #[test]
    fn cancel_returns_to_empty_composing() {
        let mut compose = ComposeState::new();
        compose.begin_edit(&own_message(3, "x"), ME).expect("own");
        compose.cancel_edit();
        assert_eq!(compose.mode(), ComposeMode::Composing);
        assert_eq!(compose.content(), "");
    }

    #[test]
    fn clearing_draft_externally_leaves_edit_mode() {
        let mut compose = ComposeState::new();
        compose.begin_edit(&own_message(3, "x"), ME).expect("own");

        compose.replace_draft("still editing");
        assert_eq!(compose.mode(), ComposeMode::Editing(3));

        compose.replace_draft("");
        assert_eq!(compose.mode(), ComposeMode::Composing);
    }

    #[test]
    fn typing_does_not_leave_edit_mode() {
        let mut compose = ComposeState::new();
        compose.begin_edit(&own_message(3, "x"), ME).expect("own");
        compose.input("");
        assert_eq!(compose.mode(), ComposeMode::Editing(3));
        assert!(!compose.can_submit());
    }

    #[test]
    fn blank_content_disables_submit() {
        let mut compose = ComposeState::new();
        assert!(compose.begin_submit(PEER).is_none());
        compose.input("   ");
        assert!(compose.begin_submit(PEER).is_none());
        assert!(!compose.is_pending());
    }

    #[test]
    fn pending_submission_blocks_duplicates() {
        let mut compose = ComposeState::new();
        compose.input("once");
        assert!(compose.begin_submit(PEER).is_some());
        assert!(compose.begin_submit(PEER).is_none());
    }

    #[test]
    fn failed_submission_keeps_draft() {
        let mut compose = ComposeState::new();
        compose.begin_edit(&own_message(9, "draft"), ME).expect("own");
        compose.begin_submit(PEER).expect("enabled");
        compose.finish_submit(false);

        assert!(!compose.is_pending());
        assert_eq!(compose.mode(), ComposeMode::Editing(9));
        assert_eq!(compose.content(), "draft");
        assert!(compose.can_submit());
    }

    #[test]
    fn only_plain_enter_submits() {
        assert!(KeyPress::enter().submits());
        assert!(!KeyPress::default().submits());
        for key in [
            KeyPress { shift: true, ..KeyPress::enter() },
            KeyPress { ctrl: true, ..KeyPress::enter() },
            KeyPress { alt: true, ..KeyPress::enter() },
        ] {
            assert!(!key.submits());
        }
    }
}
