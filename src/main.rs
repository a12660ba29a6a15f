use std::{future::IntoFuture, process, sync::Arc, time::Duration};

use folio::{
    application::{
        content::{CmsSources, ContentService},
        error::AppError,
        views,
    },
    cache::{CacheConfig, CacheService},
    config::{self, DumpArgs, DumpCollection},
    infra::{
        error::InfraError,
        http::{self, HttpState},
        notion::NotionClient,
        telemetry,
    },
};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    let cache = CacheService::init(CacheConfig::from(&settings.cache));
    let content = build_content_service(&settings, Arc::clone(&cache))?;

    let result = match command {
        config::Command::Serve(_) => run_serve(&settings, content).await,
        config::Command::Dump(args) => run_dump(&content, &args).await,
    };

    cache.shutdown();
    result
}

fn build_content_service(
    settings: &config::Settings,
    cache: Arc<CacheService>,
) -> Result<ContentService, AppError> {
    let store = NotionClient::new(&settings.cms)?;
    Ok(ContentService::new(
        Arc::new(store),
        cache,
        CmsSources::from(&settings.cms),
        settings.site.default_locale,
    ))
}

async fn run_serve(settings: &config::Settings, content: ContentService) -> Result<(), AppError> {
    if settings.site.warm_on_start {
        // A cold cache still serves; collections are fetched on first use.
        if let Err(err) = content.warm().await {
            warn!(error = %err, "Startup cache warmup failed");
        }
    }

    if settings.server.revalidate_secret.is_none() {
        info!("No revalidation secret configured; webhook disabled");
    }

    let state = HttpState::new(content, settings.server.revalidate_secret.clone());
    serve_http(settings, state).await
}

async fn serve_http(settings: &config::Settings, state: HttpState) -> Result<(), AppError> {
    let router = http::build_router(state);
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(addr = %settings.server.addr, "HTTP listener bound");

    let (signal_tx, signal_rx) = watch::channel(false);
    let signal_task = tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        let _ = signal_tx.send(true);
    });

    let mut server_signal = signal_rx.clone();
    let server = axum::serve(listener, router.into_make_service()).with_graceful_shutdown(
        async move {
            let _ = server_signal.wait_for(|stop| *stop).await;
        },
    );

    let grace = settings.server.graceful_shutdown;
    let mut deadline_signal = signal_rx;
    let result = tokio::select! {
        result = server.into_future() => result
            .map_err(|err| AppError::from(InfraError::server(err.to_string()))),
        _ = drain_deadline(&mut deadline_signal, grace) => {
            warn!(grace_seconds = grace.as_secs(), "Graceful shutdown timed out");
            Ok(())
        }
    };

    signal_task.abort();
    info!("HTTP server stopped");
    result
}

async fn drain_deadline(signal: &mut watch::Receiver<bool>, grace: Duration) {
    if signal.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
    tokio::time::sleep(grace).await;
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("Shutdown signal received");
}

async fn run_dump(content: &ContentService, args: &DumpArgs) -> Result<(), AppError> {
    let default_locale = content.default_locale();
    match args.collection {
        DumpCollection::Pages => print_json(&content.localized_pages().await?),
        DumpCollection::Posts if args.drafts => print_json(&views::canonical_posts(
            &content.blog_posts_draft().await?,
            default_locale,
        )),
        DumpCollection::Posts => print_json(&views::canonical_posts(
            &content.blog_posts().await?,
            default_locale,
        )),
        DumpCollection::Ideas => print_json(&views::canonical_ideas(
            &content.business_ideas().await?,
            default_locale,
        )),
        DumpCollection::Tags => print_json(content.blog_tags().await?.as_ref()),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::unexpected(format!("failed to serialize output: {err}")))?;
    println!("{rendered}");
    Ok(())
}
