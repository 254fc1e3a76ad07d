mod flow;

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use teloxide::{prelude::*, types::ChatId, utils::command::BotCommands};
use tokio::sync::mpsc::UnboundedSender;

use veluna_booking::{BonusBalanceCache, BookingNotice, ClientConfig, RestBookingApi};

use flow::ChatSession;

/// Bonus-cache sweep interval (seconds).
const BALANCE_CLEANUP_SECS: u64 = 300;

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase")]
enum Command {
    #[command(description = "Записаться")]
    Start,
    #[command(description = "Мои записи")]
    MyBookings,
    #[command(description = "Помощь")]
    Help,
}

/// Shared bot state: the API client, per-chat wizard sessions, the
/// session-wide bonus balance cache and the booking notice channel.
#[derive(Clone)]
struct BotState {
    api: Arc<RestBookingApi>,
    config: ClientConfig,
    sessions: Arc<DashMap<ChatId, Arc<tokio::sync::Mutex<ChatSession>>>>,
    balances: Arc<BonusBalanceCache>,
    notices: UnboundedSender<BookingNotice>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("info".parse()?),
        )
        .init();

    let bot_token = std::env::var("BOT_TOKEN").expect("BOT_TOKEN must be set");
    let admin_tg_id: Option<i64> = std::env::var("ADMIN_TG_ID")
        .ok()
        .and_then(|v| v.parse().ok());

    let config = ClientConfig::from_env();
    let api = Arc::new(RestBookingApi::new(&config)?);
    let balances = Arc::new(BonusBalanceCache::new(config.bonus_cache_ttl));

    let bot = Bot::new(&bot_token);

    tracing::info!("🌿 Veluna booking bot starting...");

    // ── Booking notices → admin chat ──
    let (notices, mut notice_rx) = tokio::sync::mpsc::unbounded_channel();
    let notify_bot = bot.clone();
    tokio::spawn(async move {
        while let Some(notice) = notice_rx.recv().await {
            let BookingNotice::AppointmentCreated { appointment_id } = notice;
            tracing::info!("appointment {} created", appointment_id);
            if let Some(admin) = admin_tg_id {
                let _ = notify_bot
                    .send_message(
                        ChatId(admin),
                        format!("📋 Новая запись №{appointment_id}"),
                    )
                    .await;
            }
        }
    });

    // ── Background task: sweep stale bonus balances ──
    let cleanup_balances = balances.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(BALANCE_CLEANUP_SECS));
        loop {
            interval.tick().await;
            cleanup_balances.cleanup();
        }
    });

    let state = BotState {
        api,
        config,
        sessions: Arc::new(DashMap::new()),
        balances,
        notices,
    };

    // Commands, then inline-button callbacks, then free-text input for the
    // details step — in that order, so commands never reach the text branch.
    let cmd_handler = Update::filter_message()
        .filter_command::<Command>()
        .endpoint({
            let state = state.clone();
            move |bot: Bot, msg: Message, cmd: Command| {
                let state = state.clone();
                async move {
                    handle_command(bot, msg, cmd, &state).await?;
                    Ok::<(), Box<dyn std::error::Error + Send + Sync>>(())
                }
            }
        });

    let callback_handler = Update::filter_callback_query().endpoint({
        let state = state.clone();
        move |bot: Bot, q: CallbackQuery| {
            let state = state.clone();
            async move {
                flow::handle_callback(bot, q, &state).await?;
                Ok::<(), Box<dyn std::error::Error + Send + Sync>>(())
            }
        }
    });

    let text_handler = Update::filter_message().endpoint({
        let state = state.clone();
        move |bot: Bot, msg: Message| {
            let state = state.clone();
            async move {
                flow::handle_text(bot, msg, &state).await?;
                Ok::<(), Box<dyn std::error::Error + Send + Sync>>(())
            }
        }
    });

    let handler = dptree::entry()
        .branch(cmd_handler)
        .branch(callback_handler)
        .branch(text_handler);

    Dispatcher::builder(bot, handler)
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

// ── Command handlers ──

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    state: &BotState,
) -> anyhow::Result<()> {
    match cmd {
        Command::Start => {
            flow::start_wizard(&bot, msg.chat.id, state).await?;
        }

        Command::MyBookings => {
            flow::show_my_bookings(&bot, msg.chat.id, state).await?;
        }

        Command::Help => {
            bot.send_message(
                msg.chat.id,
                "🌿 <b>Veluna — запись в студию</b>\n\n\
                 /start — записаться на услугу\n\
                 /mybookings — мои записи\n\
                 /help — помощь",
            )
            .parse_mode(teloxide::types::ParseMode::Html)
            .await?;
        }
    }

    Ok(())
}
