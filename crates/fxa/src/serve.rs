//! Foreground bot: HTTP surface plus Telegram delivery in the configured mode.

use std::sync::Arc;

use teloxide::prelude::*;
use tokio_util::sync::CancellationToken;

use fxa_core::{
    assistant::Assistant,
    broadcast::DailyBroadcast,
    config::Config,
    delivery::DeliveryMode,
    errors::Error,
    rates::RateService,
    responder::Responder,
    Result,
};
use fxa_http::AppState;
use fxa_openai::OpenAiAssistant;
use fxa_rates::YahooRateProvider;
use fxa_telegram::{build_bot, polling, setup, TelegramFrontend, TelegramMessenger};

pub async fn run(force_polling: bool) -> Result<()> {
    let mut cfg = Config::load()?;
    if force_polling {
        cfg.delivery_mode = DeliveryMode::Polling;
    }
    let cfg = Arc::new(cfg);

    fxa_core::logging::init("fxa")?;
    tracing::info!(mode = %cfg.delivery_mode, base = %cfg.base_currency, "starting fxa");

    let rates = RateService::new(Arc::new(YahooRateProvider::from_config(&cfg)?));
    let assistant: Option<Arc<dyn Assistant>> = match OpenAiAssistant::from_config(&cfg)? {
        Some(a) => {
            tracing::info!(model = a.model(), "ai fallback enabled");
            Some(Arc::new(a))
        }
        None => {
            tracing::info!("OPENAI_API_KEY not set, ai fallback disabled");
            None
        }
    };
    let responder = Arc::new(Responder::new(&cfg, rates.clone(), assistant));

    let bot = build_bot(&cfg)?;
    let username = match bot.get_me().await {
        Ok(me) => Some(me.username().to_string()),
        Err(e) => {
            tracing::warn!("get_me failed, group mentions disabled: {e}");
            None
        }
    };
    if let Err(e) = setup::register_commands(&bot).await {
        tracing::warn!("failed to register bot commands: {e}");
    }

    let messenger = Arc::new(TelegramMessenger::new(bot.clone()));
    let broadcast = Arc::new(DailyBroadcast::from_config(&cfg, rates, messenger.clone()));
    let frontend =
        TelegramFrontend::new(responder.clone(), messenger, username).with_broadcast(broadcast.clone());

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));
    let daily = tokio::spawn(broadcast.run(cancel.clone()));

    let mut state = AppState::new(responder, cfg.delivery_mode, cfg.max_inbound_len);
    let poller = match cfg.delivery_mode {
        DeliveryMode::Webhook => {
            if let Some(url) = &cfg.telegram_webhook_url {
                setup::set_webhook(&bot, url).await?;
            } else {
                tracing::warn!("TELEGRAM_WEBHOOK_URL not set; assuming the webhook is registered");
            }
            state = state.with_telegram(frontend);
            None
        }
        // Startup fails if the webhook cannot be cleared.
        DeliveryMode::Polling => Some(
            polling::start_polling(
                bot,
                frontend,
                cfg.poll_timeout,
                cfg.poll_interval,
                cancel.clone(),
            )
            .await?,
        ),
    };

    let served = fxa_http::serve(&cfg.bind_addr(), Arc::new(state), cancel.clone()).await;
    // The server can also stop on its own (bind failure); take polling down with it.
    cancel.cancel();

    if let Some(handle) = poller {
        if let Err(e) = handle.await {
            tracing::error!("polling task panicked: {e}");
        }
    }
    if let Err(e) = daily.await {
        tracing::error!("daily rates task panicked: {e}");
    }

    served.map_err(|e| Error::External(format!("http server failed: {e}")))?;
    tracing::info!("fxa stopped");
    Ok(())
}

async fn cancel_on_signal(cancel: CancellationToken) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!("cannot listen for SIGTERM: {e}");
                let _ = ctrl_c.await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }

    tracing::info!("shutdown requested");
    cancel.cancel();
}
