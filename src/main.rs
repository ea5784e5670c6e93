use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ytaudio::approval::store::JsonFileStore;
use ytaudio::approval::AuthorizationGate;
use ytaudio::cli::Cli;
use ytaudio::config::{self, AppConfig};
use ytaudio::jobs;
use ytaudio::media::ytdlp::YtDlpResolver;
use ytaudio::notification::admin::AdminNotifier;
use ytaudio::notification::retry::RetryPolicy;
use ytaudio::notification::webhook::WebhookNotifier;
use ytaudio::pipeline::RequestPipeline;
use ytaudio::server::Dispatcher;
use ytaudio::transcode::ffmpeg::FfmpegTranscoder;
use ytaudio::transcode::remote::RemoteTranscoder;
use ytaudio::transport::telegram::TelegramTransport;
use ytaudio::transport::ChatTransport;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Cli::parse();
    let mut settings = config::load_settings();
    if let Some(dir) = args.work_dir.clone() {
        settings.work_dir = dir;
    }

    let app_config = AppConfig::load(&args.config)?;
    reset_work_dir(&settings.work_dir).await?;

    let mut telegram = TelegramTransport::new(&app_config.bot_api_key);
    if let Some(url) = args.api_url.clone() {
        telegram = telegram.with_api_url(url);
    }
    let username = telegram.verify().await?;
    tracing::info!(bot = %username, "authorized on account");
    match app_config.admin() {
        Some(admin_id) => tracing::info!(admin_id, "approval mode: admin decides"),
        None => tracing::warn!("no AdminID configured, every chat that is not banned may use the bot"),
    }

    let transport: Arc<dyn ChatTransport> = Arc::new(telegram.clone());
    let webhook = WebhookNotifier::new(
        settings.webhook_urls.clone(),
        settings.webhook_secret.clone(),
    );

    let gate = AuthorizationGate::new(
        app_config,
        settings.pending_ttl,
        Arc::new(JsonFileStore::new(&args.config)),
        transport.clone(),
        AdminNotifier::new(transport.clone(), RetryPolicy::default()),
    )
    .with_webhook(webhook.clone());

    let pipeline = RequestPipeline::new(
        transport,
        Arc::new(YtDlpResolver::new(settings.ytdlp_bin.clone())),
        Arc::new(FfmpegTranscoder::new(settings.ffmpeg_bin.clone())),
        Arc::new(RemoteTranscoder::new(settings.converter_url.clone())),
        settings.work_dir.clone(),
    )
    .with_notify_failures(settings.notify_failures)
    .with_webhook(webhook);

    if settings.pending_ttl.is_some() {
        jobs::pending_sweep::spawn(gate.clone(), jobs::pending_sweep::SWEEP_INTERVAL);
    }

    let dispatcher = Dispatcher::new(gate, Arc::new(pipeline));
    tokio::select! {
        _ = dispatcher.serve(telegram.updates()) => {}
        res = tokio::signal::ctrl_c() => {
            res.context("listening for shutdown signal")?;
            tracing::info!("shutting down");
        }
    }

    Ok(())
}

fn init_tracing() {
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::{trace as sdktrace, Resource};

    let json_logs = std::env::var("YTAUDIO_LOG_FORMAT").is_ok_and(|v| v == "json");
    let mut otel_error = None;
    let telemetry_layer = if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        match opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(opentelemetry_otlp::new_exporter().tonic())
            .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
                KeyValue::new("service.name", "ytaudio-gateway"),
            ])))
            .install_batch(opentelemetry_sdk::runtime::Tokio)
        {
            Ok(tracer) => Some(tracing_opentelemetry::layer().with_tracer(tracer)),
            Err(e) => {
                otel_error = Some(e);
                None
            }
        }
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "ytaudio=debug".into()),
        ))
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(tracing_subscriber::fmt::layer))
        .with(telemetry_layer)
        .init();

    if let Some(e) = otel_error {
        tracing::warn!(error = %e, "OpenTelemetry exporter not installed, logging only");
    }
}

/// Clears and recreates the transient artifact directory.
async fn reset_work_dir(dir: &Path) -> anyhow::Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(e).with_context(|| format!("clearing work dir {}", dir.display()));
        }
    }
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("creating work dir {}", dir.display()))?;
    tracing::info!(path = %dir.display(), "work dir ready");
    Ok(())
}
