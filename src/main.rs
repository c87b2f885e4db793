mod config;
mod error;
mod quiz;
mod screen;

use std::sync::Arc;

use dotenv::dotenv;
use log::{debug, info, warn};
use quiz::{
    controller::{QuestionSource, SessionController},
    gemini::GeminiClient,
};
use screen::Action;
use teloxide::{
    dispatching::dialogue::InMemStorage,
    prelude::*,
    types::{ChatAction, MessageId},
};

use crate::config::Config;

type QuizDialogue = Dialogue<State, InMemStorage<State>>;
type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;
type SharedSource = Arc<dyn QuestionSource>;

#[derive(Clone, Default)]
pub enum State {
    #[default]
    Start,
    Quiz(SessionController),
}

#[tokio::main]
async fn main() {
    let dotenv_result = dotenv();
    pretty_env_logger::init();
    if let Err(err) = dotenv_result {
        warn!("No .env loaded: {}", err);
    }

    let config = Arc::new(Config::from_env());
    info!(
        "Starting trivia bot with model {} and default prompt {:?}",
        config.gemini.model, config.default_prompt
    );

    let bot = Bot::from_env();
    let source: SharedSource = Arc::new(GeminiClient::new(config.gemini.clone()));

    let handler = dptree::entry()
        .branch(
            Update::filter_message()
                .enter_dialogue::<Message, InMemStorage<State>, State>()
                .branch(dptree::case![State::Start].endpoint(start))
                .branch(dptree::case![State::Quiz(controller)].endpoint(receive_message)),
        )
        .branch(
            Update::filter_callback_query()
                .enter_dialogue::<CallbackQuery, InMemStorage<State>, State>()
                .endpoint(receive_action),
        );

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![InMemStorage::<State>::new(), source, config])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

const GREETING_TEXT: &str = "¡Hola! Soy un bot de trivia. Escríbeme un tema (por ejemplo \"10 preguntas sobre el sistema solar\") y prepararé un cuestionario. Mientras tanto, empecemos con uno:";
const RESTART_COMMANDS: [&str; 2] = ["/start", "/restart"];

async fn start(
    bot: Bot,
    dialogue: QuizDialogue,
    source: SharedSource,
    config: Arc<Config>,
    msg: Message,
) -> HandlerResult {
    bot.send_message(msg.chat.id, GREETING_TEXT).await?;

    let prompt = match msg.text() {
        Some(text) if !text.trim().is_empty() && !RESTART_COMMANDS.contains(&text.trim()) => {
            text.trim().to_string()
        }
        _ => config.default_prompt.clone(),
    };
    request_session(&bot, &dialogue, &source, SessionController::default(), &prompt).await
}

async fn receive_message(
    bot: Bot,
    dialogue: QuizDialogue,
    source: SharedSource,
    controller: SessionController,
    msg: Message,
) -> HandlerResult {
    let Some(text) = msg.text().map(str::trim).filter(|text| !text.is_empty()) else {
        bot.send_message(msg.chat.id, "Por favor, escribe el tema del cuestionario (texto)")
            .await?;
        return Ok(());
    };

    let prompt = if RESTART_COMMANDS.contains(&text) {
        controller.prompt().to_string()
    } else {
        info!("Chat {} asked for a new quiz: {:?}", msg.chat.id.0, text);
        text.to_string()
    };
    request_session(&bot, &dialogue, &source, controller, &prompt).await
}

async fn receive_action(
    bot: Bot,
    dialogue: QuizDialogue,
    source: SharedSource,
    q: CallbackQuery,
) -> HandlerResult {
    bot.answer_callback_query(q.id.clone()).await?;

    let Some(action) = q.data.as_deref().and_then(|data| data.parse::<Action>().ok()) else {
        warn!("Ignoring unknown button data {:?}", q.data);
        return Ok(());
    };
    let Some(message) = q.message else {
        return Ok(());
    };
    let Some(State::Quiz(mut controller)) = dialogue.get().await? else {
        return Ok(());
    };

    if action.generation().is_some_and(|g| g != controller.generation()) {
        debug!("Ignoring {} from a superseded screen", action);
        return Ok(());
    }

    let changed = match action {
        Action::Select { option, .. } => controller.select_answer(option).is_committed(),
        Action::Prev { .. } => controller.retreat(),
        Action::Next { .. } => controller.advance(),
        Action::Restart => {
            let prompt = controller.prompt().to_string();
            return request_session(&bot, &dialogue, &source, controller, &prompt).await;
        }
        Action::Noop => false,
    };

    // Telegram refuses edits that change nothing.
    if !changed {
        return Ok(());
    }

    dialogue.update(State::Quiz(controller.clone())).await?;
    show(&bot, message.chat.id, message.id, screen::render(&controller)).await
}

/// Runs one generation request for `prompt`, showing a loading screen until it lands.
async fn request_session(
    bot: &Bot,
    dialogue: &QuizDialogue,
    source: &SharedSource,
    mut controller: SessionController,
    prompt: &str,
) -> HandlerResult {
    let chat_id = dialogue.chat_id();
    let ticket = controller.begin_request(prompt);
    dialogue.update(State::Quiz(controller)).await?;

    let loading = bot.send_message(chat_id, screen::LOADING_TEXT).await?;
    // Only cosmetic, so a failure here doesn't matter
    let _ = bot.send_chat_action(chat_id, ChatAction::Typing).await;

    let outcome = source.generate_questions(prompt).await;

    let Some(State::Quiz(mut controller)) = dialogue.get().await? else {
        return Ok(());
    };
    if !controller.finish_request(ticket, outcome) {
        bot.edit_message_text(chat_id, loading.id, screen::SUPERSEDED_TEXT)
            .await?;
        return Ok(());
    }
    if let Some(failure) = controller.last_failure() {
        warn!("Chat {} got an empty quiz: {:?}", chat_id.0, failure);
    }

    dialogue.update(State::Quiz(controller.clone())).await?;
    let screen = screen::render(&controller);
    if let Err(err) = show(bot, chat_id, loading.id, screen).await {
        // Leave the chat on a screen that can restart, never on the loading text.
        warn!("Chat {} could not show its quiz: {}", chat_id.0, err);
        show(bot, chat_id, loading.id, screen::empty_screen()).await?;
    }
    Ok(())
}

async fn show(
    bot: &Bot,
    chat_id: ChatId,
    message_id: MessageId,
    screen: screen::Screen,
) -> HandlerResult {
    let edit = bot.edit_message_text(chat_id, message_id, screen.text);
    match screen.keyboard {
        Some(keyboard) => edit.reply_markup(keyboard).await?,
        None => edit.await?,
    };
    Ok(())
}
