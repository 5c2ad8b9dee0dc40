use crate::bot::{handlers, TelegramTransport};
use crate::config::BotSettings;
use herald_core::clock::{Clock, SystemClock};
use herald_core::config::RelaySettings;
use herald_core::content::Content;
use herald_core::directory::{Directory, UsersTable};
use herald_core::dispatch;
use herald_core::scheduler::{ScheduleTable, Scheduler};
use herald_core::storage::JsonFileTable;
use herald_core::transport::Transport;
use herald_runtime::{spawn_schedule_runtime, ScheduleRuntimeConfig};
use std::sync::Arc;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Run the Telegram transport runtime.
pub async fn run_bot(settings: Arc<BotSettings>) {
    let content = Arc::new(init_content(&settings.relay));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let bot = Bot::new(settings.telegram.telegram_token.clone());
    let transport: Arc<dyn Transport> = Arc::new(TelegramTransport::new(bot.clone()));

    let directory = init_directory(&settings.relay, clock.clone()).await;
    let scheduler = init_scheduler(
        &settings.relay,
        directory.clone(),
        transport.clone(),
        clock.clone(),
        &content.texts.scheduled_prefix,
    )
    .await;

    let relay = Arc::new(dispatch::Dispatcher::new(
        &settings.relay,
        content,
        directory,
        scheduler.clone(),
        transport,
        clock,
    ));
    info!(
        "Relay initialized ({} admins, limit {} messages per {}s).",
        settings.relay.admin_ids().len(),
        settings.relay.rate_limit_max_messages,
        settings.relay.rate_limit_window_secs
    );

    let cancel = CancellationToken::new();
    let schedule_loop = spawn_schedule_runtime(
        scheduler,
        ScheduleRuntimeConfig::new(settings.relay.schedule_tick()),
        cancel.clone(),
    );

    let handler = setup_handler();
    info!("Bot is running...");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![relay])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    cancel.cancel();
    match schedule_loop.await {
        Ok(delivered) => info!("Shutdown complete ({delivered} scheduled items delivered)."),
        Err(e) => error!("Schedule loop terminated abnormally: {e}"),
    }
}

fn init_content(settings: &RelaySettings) -> Content {
    let Some(path) = settings.content_path.as_deref() else {
        info!("Using built-in content.");
        return Content::default();
    };
    match Content::from_yaml_file(path) {
        Ok(content) => {
            info!("Content loaded from {}.", path.display());
            content
        }
        Err(e) => {
            error!("Failed to load content from {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}

async fn init_directory(settings: &RelaySettings, clock: Arc<dyn Clock>) -> Arc<Directory> {
    let store = Arc::new(JsonFileTable::<UsersTable>::new(&settings.users_path));
    match Directory::load(store, clock).await {
        Ok(directory) => Arc::new(directory),
        Err(e) => {
            error!(
                "Failed to load users table {}: {}",
                settings.users_path.display(),
                e
            );
            std::process::exit(1);
        }
    }
}

async fn init_scheduler(
    settings: &RelaySettings,
    directory: Arc<Directory>,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    prefix: &str,
) -> Arc<Scheduler> {
    let store = Arc::new(JsonFileTable::<ScheduleTable>::new(&settings.schedule_path));
    match Scheduler::load(store, directory, transport, clock, prefix).await {
        Ok(scheduler) => Arc::new(scheduler),
        Err(e) => {
            error!(
                "Failed to load schedule table {}: {}",
                settings.schedule_path.display(),
                e
            );
            std::process::exit(1);
        }
    }
}

fn setup_handler() -> UpdateHandler<teloxide::RequestError> {
    dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handle_callback))
        .branch(Update::filter_message().endpoint(handle_message))
}

async fn handle_message(
    msg: Message,
    relay: Arc<dispatch::Dispatcher>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = handlers::handle_message(msg, relay).await {
        error!("Message handler error: {}", e);
    }
    respond(())
}

async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    relay: Arc<dispatch::Dispatcher>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = handlers::handle_callback(bot, q, relay).await {
        error!("Callback handler error: {}", e);
    }
    respond(())
}
