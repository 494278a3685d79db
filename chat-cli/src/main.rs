use std::process;

use anyhow::{Context, Result, anyhow};
use chat_client::{
    CacheEvent, ChangePasswordForm, ChatClient, ChatClientError, ChatSummary, ClientSettings,
    ComposeMode, ComposeState, Contact, Message, QueryKey, QueryState, RegisterForm,
    UpdateProfileForm, User, field_messages, filter_chats, format_date,
};
use chrono::Local;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::{self, error::RecvError};

mod logging;

const UNAUTHORIZED_HINT: &str =
    "требуется авторизация: выполните `chat-cli login ...` или `chat-cli register ...`";

#[derive(Debug, Parser)]
#[command(name = "chat-cli", version, about = "CLI клиент чата")]
struct Cli {
    /// Адрес REST API (перекрывает CHAT_API_URL).
    #[arg(long, global = true)]
    server: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Регистрация пользователя.
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        fullname: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Вход пользователя.
    Login {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    /// Выход: токен удаляется.
    Logout,
    /// Профиль текущего пользователя.
    Profile,
    /// Обновление профиля.
    UpdateProfile {
        #[arg(long)]
        username: String,
        #[arg(long)]
        fullname: String,
        #[arg(long)]
        email: String,
    },
    /// Смена пароля.
    ChangePassword {
        #[arg(long)]
        old_password: String,
        #[arg(long)]
        new_password: String,
        #[arg(long)]
        confirm_password: String,
    },
    /// Список чатов.
    Chats {
        /// Фильтр по полному имени собеседника.
        #[arg(long)]
        filter: Option<String>,
        /// Обновлять список, пока не нажат Ctrl+C.
        #[arg(long)]
        watch: bool,
    },
    /// Переписка с пользователем.
    Messages {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        watch: bool,
    },
    /// Отправка сообщения.
    Send {
        #[arg(long)]
        to: i64,
        #[arg(long)]
        content: String,
    },
    /// Правка своего сообщения в переписке с `--user`.
    Edit {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        id: i64,
        #[arg(long)]
        content: String,
    },
    /// Удаление сообщения в переписке с `--user`.
    Delete {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        id: i64,
    },
    /// Поиск пользователей.
    Search {
        #[arg(long)]
        query: String,
    },
    /// Интерактивная переписка: строки из stdin уходят собеседнику.
    Chat {
        #[arg(long)]
        user: i64,
    },
}

impl Command {
    /// Имя подкоманды для логов; аргументы (в том числе пароли) не попадают в вывод.
    fn name(&self) -> &'static str {
        match self {
            Self::Register { .. } => "register",
            Self::Login { .. } => "login",
            Self::Logout => "logout",
            Self::Profile => "profile",
            Self::UpdateProfile { .. } => "update-profile",
            Self::ChangePassword { .. } => "change-password",
            Self::Chats { .. } => "chats",
            Self::Messages { .. } => "messages",
            Self::Send { .. } => "send",
            Self::Edit { .. } => "edit",
            Self::Delete { .. } => "delete",
            Self::Search { .. } => "search",
            Self::Chat { .. } => "chat",
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("Ошибка: {err}");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let settings = ClientSettings::from_env().context("некорректная конфигурация")?;
    logging::init_logging(&settings.log_level)?;
    let settings = apply_server_override(settings, cli.server);

    let client = ChatClient::from_settings(&settings).map_err(map_client_error)?;
    tracing::debug!(
        command = cli.command.name(),
        api_url = %settings.api_url,
        "dispatching command"
    );

    match cli.command {
        Command::Register {
            username,
            fullname,
            email,
            password,
        } => {
            let auth = client
                .register(RegisterForm {
                    username,
                    fullname,
                    email,
                    password,
                })
                .await
                .map_err(map_client_error)?;
            println!("Регистрация успешна: {}", auth.message);
        }
        Command::Login { username, password } => {
            let auth = client
                .login(&username, &password)
                .await
                .map_err(map_client_error)?;
            println!("Вход выполнен: {}", auth.message);
        }
        Command::Logout => {
            client.logout().map_err(map_client_error)?;
            println!("Выход выполнен");
        }
        Command::Profile => {
            let profile = client.profile().await.map_err(map_client_error)?;
            println!("id: {}", profile.id);
            println!("username: {}", profile.username);
            println!("fullname: {}", profile.fullname);
            println!("email: {}", profile.email);
        }
        Command::UpdateProfile {
            username,
            fullname,
            email,
        } => {
            let profile = client
                .update_profile(UpdateProfileForm {
                    fullname,
                    email,
                    username,
                })
                .await
                .map_err(map_client_error)?;
            println!("Профиль обновлён: {} (@{})", profile.fullname, profile.username);
        }
        Command::ChangePassword {
            old_password,
            new_password,
            confirm_password,
        } => {
            let ack = client
                .change_password(ChangePasswordForm {
                    old_password,
                    new_password,
                    confirm_password,
                })
                .await
                .map_err(map_client_error)?;
            println!("{}", ack.message);
        }
        Command::Chats { filter, watch } => {
            let filter = filter.unwrap_or_default();
            if watch {
                watch_chats(&client, &filter).await?;
            } else {
                let chats = client.chats().await.map_err(map_client_error)?;
                print_chats(&chats, &filter);
            }
        }
        Command::Messages { user, watch } => {
            if watch {
                watch_messages(&client, user).await?;
            } else {
                let me = client.current_user_id().map_err(map_client_error)?;
                let messages = client.messages(user).await.map_err(map_client_error)?;
                print_messages(&messages, me);
            }
        }
        Command::Send { to, content } => {
            let mut compose = ComposeState::new();
            compose.input(content);
            let ack = client
                .submit(&mut compose, to)
                .await
                .map_err(map_client_error)?
                .ok_or_else(|| anyhow!("пустое сообщение не отправляется"))?;
            println!("{}", ack.message);
        }
        Command::Edit { user, id, content } => {
            let me = client.current_user_id().map_err(map_client_error)?;
            let messages = client.messages(user).await.map_err(map_client_error)?;
            let message = find_message(&messages, id)?;

            let mut compose = ComposeState::new();
            compose.begin_edit(message, me).map_err(map_client_error)?;
            compose.replace_draft(content);
            let ack = client
                .submit(&mut compose, user)
                .await
                .map_err(map_client_error)?
                .ok_or_else(|| anyhow!("пустой текст: правка не отправлена"))?;
            println!("{}", ack.message);
        }
        Command::Delete { user, id } => {
            let ack = client
                .delete_message(user, id)
                .await
                .map_err(map_client_error)?;
            println!("Сообщение удалено: id={id} ({})", ack.message);
        }
        Command::Search { query } => {
            let users = client.search_users(&query).await.map_err(map_client_error)?;
            print_users(&users);
        }
        Command::Chat { user } => run_chat(&client, user).await?,
    }

    Ok(())
}

fn apply_server_override(mut settings: ClientSettings, server: Option<String>) -> ClientSettings {
    let raw = server.unwrap_or(settings.api_url);
    settings.api_url = normalize_server(raw);
    settings
}

fn normalize_server(server: String) -> String {
    if server.starts_with("http://") || server.starts_with("https://") {
        return server;
    }

    format!("http://{server}")
}

fn map_client_error(err: ChatClientError) -> anyhow::Error {
    let message = match err {
        ChatClientError::Unauthorized => UNAUTHORIZED_HINT.to_string(),
        ChatClientError::NotFound => "ресурс не найден".to_string(),
        ChatClientError::Api { status, message } => {
            format!("сервер ответил {status}: {message}")
        }
        ChatClientError::InvalidRequest(message) => format!("некорректный запрос: {message}"),
        ChatClientError::Validation(errors) => {
            let details: Vec<String> = field_messages(&errors)
                .into_iter()
                .map(|(field, message)| format!("{field}: {message}"))
                .collect();
            format!("ошибка валидации: {}", details.join("; "))
        }
        ChatClientError::Http(err) => format!("ошибка HTTP: {err}"),
        ChatClientError::Storage(err) => format!("ошибка хранилища токена: {err}"),
    };
    anyhow!(message)
}

fn find_message(messages: &[Message], id: i64) -> Result<&Message> {
    messages
        .iter()
        .find(|message| message.id == id)
        .ok_or_else(|| anyhow!("сообщение id={id} не найдено в переписке"))
}

/// Ждёт событий кэша по `key` и перерисовывает экран до Ctrl+C.
async fn follow(
    events: &mut broadcast::Receiver<CacheEvent>,
    key: &QueryKey,
    mut render: impl FnMut() -> Result<()>,
) -> Result<()> {
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            event = events.recv() => match event {
                Ok(CacheEvent::Updated(updated)) | Ok(CacheEvent::Failed(updated))
                    if &updated == key => render()?,
                Ok(CacheEvent::Cleared) | Err(RecvError::Closed) => return Ok(()),
                Ok(_) => {}
                Err(RecvError::Lagged(_)) => render()?,
            },
        }
    }
}

async fn watch_chats(client: &ChatClient, filter: &str) -> Result<()> {
    let mut events = client.cache().subscribe();
    let handle = client.watch_chats().map_err(map_client_error)?;

    let result = follow(&mut events, &QueryKey::Chats, || {
        let state: QueryState<Vec<ChatSummary>> = client.cache().state(&QueryKey::Chats);
        render_state(&state, |chats| print_chats(chats, filter))
    })
    .await;

    handle.stop().await;
    tracing::debug!("chat list watch stopped");
    result
}

async fn watch_messages(client: &ChatClient, user: i64) -> Result<()> {
    let me = client.current_user_id().map_err(map_client_error)?;
    let key = QueryKey::Conversation(user);
    let mut events = client.cache().subscribe();
    let handle = client.watch_conversation(user).map_err(map_client_error)?;

    let result = follow(&mut events, &key, || render_conversation(client, &key, me)).await;

    handle.stop().await;
    tracing::debug!(user, "conversation watch stopped");
    result
}

fn render_conversation(client: &ChatClient, key: &QueryKey, me: i64) -> Result<()> {
    let state: QueryState<Vec<Message>> = client.cache().state(key);
    render_state(&state, |messages| print_messages(messages, me))
}

/// Загрузка, ошибка, данные или данные с предупреждением об ошибке.
fn render_state<T>(state: &QueryState<T>, print: impl FnOnce(&T)) -> Result<()> {
    if let Some(error) = &state.error {
        if error.unauthorized {
            return Err(anyhow!(UNAUTHORIZED_HINT));
        }
    }

    if state.is_pending() {
        println!("Загрузка...");
    } else if state.is_error() {
        if let Some(error) = &state.error {
            println!("Не удалось загрузить: {} (повтор при следующем опросе)", error.message);
        }
    }

    if let Some(data) = &state.data {
        println!("----");
        print(data);
        if state.is_stale() {
            println!("(данные могут быть устаревшими)");
        }
    }
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum Input {
    Quit,
    Cancel,
    Edit(i64),
    Delete(i64),
    Text(String),
    Unknown(String),
}

fn parse_input(line: &str) -> Input {
    let trimmed = line.trim();
    let Some(command) = trimmed.strip_prefix('/') else {
        return Input::Text(line.to_string());
    };

    let mut parts = command.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let id = parts.next().and_then(|raw| raw.parse::<i64>().ok());

    match (name, id) {
        ("quit", _) => Input::Quit,
        ("cancel", _) => Input::Cancel,
        ("edit", Some(id)) => Input::Edit(id),
        ("delete", Some(id)) => Input::Delete(id),
        _ => Input::Unknown(trimmed.to_string()),
    }
}

/// Ошибки в интерактивном режиме печатаются и не прерывают сессию,
/// кроме потери авторизации.
fn report(err: ChatClientError) -> Result<()> {
    if err.is_unauthorized() {
        return Err(map_client_error(err));
    }
    eprintln!("Ошибка: {}", map_client_error(err));
    Ok(())
}

async fn run_chat(client: &ChatClient, peer: i64) -> Result<()> {
    let me = client.current_user_id().map_err(map_client_error)?;
    let key = QueryKey::Conversation(peer);
    let mut events = client.cache().subscribe();
    let handle = client.watch_conversation(peer).map_err(map_client_error)?;

    println!("Переписка с id={peer}. Команды: /edit <id>, /cancel, /delete <id>, /quit");

    let mut compose = ComposeState::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let result: Result<()> = loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(CacheEvent::Updated(updated)) | Ok(CacheEvent::Failed(updated))
                    if updated == key =>
                {
                    if let Err(err) = render_conversation(client, &key, me) {
                        break Err(err);
                    }
                }
                Ok(CacheEvent::Cleared) | Err(RecvError::Closed) => break Ok(()),
                Ok(_) => {}
                Err(RecvError::Lagged(_)) => {
                    if let Err(err) = render_conversation(client, &key, me) {
                        break Err(err);
                    }
                }
            },
            line = lines.next_line() => {
                let line = match line.context("не удалось прочитать stdin") {
                    Ok(Some(line)) => line,
                    Ok(None) => break Ok(()),
                    Err(err) => break Err(err),
                };
                let input = parse_input(&line);
                if input == Input::Quit {
                    break Ok(());
                }
                if let Err(err) = handle_input(client, &mut compose, peer, me, input).await {
                    break Err(err);
                }
            }
        }
    };

    handle.stop().await;
    tracing::debug!(peer, "chat session closed");
    result
}

async fn handle_input(
    client: &ChatClient,
    compose: &mut ComposeState,
    peer: i64,
    me: i64,
    input: Input,
) -> Result<()> {
    match input {
        Input::Quit => {}
        Input::Cancel => {
            compose.cancel_edit();
            println!("Правка отменена");
        }
        Input::Edit(id) => {
            let messages: Vec<Message> = client
                .cache()
                .get(&QueryKey::Conversation(peer))
                .unwrap_or_default();
            match find_message(&messages, id) {
                Ok(message) => match compose.begin_edit(message, me) {
                    Ok(()) => println!(
                        "Правка id={id}, текущий текст: {}\nВведите новый текст или /cancel",
                        compose.content()
                    ),
                    Err(err) => report(err)?,
                },
                Err(err) => eprintln!("Ошибка: {err}"),
            }
        }
        Input::Delete(id) => {
            if let Err(err) = client.delete_message(peer, id).await {
                report(err)?;
            }
        }
        Input::Text(text) => {
            compose.input(text);
            match client.submit(compose, peer).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    if compose.mode() == ComposeMode::Composing {
                        println!("Пустое сообщение не отправляется");
                    } else {
                        println!("Пустой текст: правка не отправлена, /cancel для отмены");
                    }
                }
                Err(err) => report(err)?,
            }
        }
        Input::Unknown(raw) => eprintln!("Неизвестная команда: {raw}"),
    }
    Ok(())
}

fn describe_message(message: &Message, me: i64) -> String {
    let author = if message.is_authored_by(me) {
        "я"
    } else {
        "собеседник"
    };
    format!(
        "[{}] {} {}: {}",
        message.id,
        format_date(&message.date, &Local::now()),
        author,
        message.content
    )
}

fn describe_contact(contact: &Contact) -> String {
    let initial = contact.initial().unwrap_or('?');
    format!(
        "({initial}) {} @{} [id={}] {}",
        contact.fullname(),
        contact.username(),
        contact.user_id(),
        contact.subtitle()
    )
}

fn print_messages(messages: &[Message], me: i64) {
    if messages.is_empty() {
        println!("Сообщений пока нет");
        return;
    }
    for message in messages {
        println!("{}", describe_message(message, me));
    }
}

fn print_chats(chats: &[ChatSummary], filter: &str) {
    let visible = filter_chats(chats, filter);
    println!("Чатов: {} (всего {})", visible.len(), chats.len());
    for chat in visible {
        let contact = Contact::from(chat.clone());
        println!(
            "- {} {}",
            describe_contact(&contact),
            format_date(&chat.date, &Local::now())
        );
    }
}

fn print_users(users: &[User]) {
    println!("Найдено: {}", users.len());
    for user in users {
        println!("- {}", describe_contact(&Contact::from(user.clone())));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_server_keeps_scheme() {
        let s = normalize_server("https://chat.example.com:8443".to_string());
        assert_eq!(s, "https://chat.example.com:8443");
    }

    #[test]
    fn normalize_server_adds_http_scheme() {
        let s = normalize_server("127.0.0.1:3000".to_string());
        assert_eq!(s, "http://127.0.0.1:3000");
    }

    #[test]
    fn server_override_defaults_to_settings() {
        let settings = apply_server_override(ClientSettings::default(), None);
        assert_eq!(settings.api_url, ClientSettings::default().api_url);
    }

    #[test]
    fn server_override_replaces_api_url() {
        let settings =
            apply_server_override(ClientSettings::default(), Some("localhost:9999".to_string()));
        assert_eq!(settings.api_url, "http://localhost:9999");
    }

    #[test]
    fn command_name_hides_arguments() {
        let command = Command::Login {
            username: "alice".to_string(),
            password: "secret1".to_string(),
        };
        assert_eq!(command.name(), "login");
        assert_eq!(
            Command::ChangePassword {
                old_password: "a".to_string(),
                new_password: "b".to_string(),
                confirm_password: "b".to_string(),
            }
            .name(),
            "change-password"
        );
    }

    #[test]
    fn parse_input_recognizes_commands() {
        assert_eq!(parse_input("/quit"), Input::Quit);
        assert_eq!(parse_input(" /cancel "), Input::Cancel);
        assert_eq!(parse_input("/edit 42"), Input::Edit(42));
        assert_eq!(parse_input("/delete 7"), Input::Delete(7));
        assert_eq!(
            parse_input("/edit nope"),
            Input::Unknown("/edit nope".to_string())
        );
        assert_eq!(parse_input("hello /quit"), Input::Text("hello /quit".to_string()));
    }

    #[test]
    fn own_messages_are_marked() {
        let message = Message {
            id: 5,
            from_user_id: 1,
            to_user_id: 2,
            content: "hi".to_string(),
            date: "not a date".to_string(),
        };
        assert_eq!(describe_message(&message, 1), "[5] not a date я: hi");
        assert_eq!(describe_message(&message, 2), "[5] not a date собеседник: hi");
    }

    #[test]
    fn contact_line_for_search_result() {
        let contact = Contact::from(User {
            id: 3,
            username: "carol".to_string(),
            fullname: "carol king".to_string(),
        });
        assert_eq!(
            describe_contact(&contact),
            "(C) carol king @carol [id=3] @carol"
        );
    }

    #[test]
    fn unauthorized_error_has_hint() {
        let err = map_client_error(ChatClientError::Unauthorized);
        assert_eq!(err.to_string(), UNAUTHORIZED_HINT);
    }

    #[test]
    fn api_error_keeps_server_message() {
        let err = map_client_error(ChatClientError::Api {
            status: 400,
            message: "Old password is incorrect".to_string(),
        });
        assert_eq!(err.to_string(), "сервер ответил 400: Old password is incorrect");
    }
}
