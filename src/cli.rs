use std::path::PathBuf;

use clap::Parser;

/// ytaudio: Telegram bot that turns video links into MP3 replies
#[derive(Debug, Parser)]
#[command(name = "ytaudio", version, about)]
pub struct Cli {
    /// Config file with the bot key and approval lists (rewritten on decisions)
    #[arg(short, long, env = "YTAUDIO_CONFIG", default_value = "config.json")]
    pub config: PathBuf,

    /// Directory for transient downloads; wiped at startup
    #[arg(long)]
    pub work_dir: Option<PathBuf>,

    /// Telegram Bot API base URL (for self-hosted API servers)
    #[arg(long, env = "YTAUDIO_TELEGRAM_API_URL")]
    pub api_url: Option<url::Url>,
}
