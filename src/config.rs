use crate::application::engine::EngineSettings;
use crate::application::sweeper::ReminderSchedule;
use crate::infrastructure::zarinpal::SANDBOX_URL;
use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Installment payment sessions and settlement reconciliation", long_about = None)]
pub struct Cli {
    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, global = true, env = "SETTLEPAY_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// 32-byte key as 64 hex characters. Required with --db-path.
    #[arg(long, global = true, env = "SETTLEPAY_ENCRYPTION_KEY", hide_env_values = true)]
    pub encryption_key: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the callback server with the expiry and reminder loops.
    Serve(ServeArgs),
    /// Import customers from a CSV export and print the resulting report.
    Import {
        /// Input customers CSV file
        file: PathBuf,
    },
    /// Print every customer as CSV.
    Customers,
    /// Print the payment history of one phone as CSV.
    History {
        phone: String,
    },
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    #[arg(long, default_value = "0.0.0.0:8443")]
    pub listen: SocketAddr,

    #[arg(long, env = "ZARINPAL_MERCHANT_ID")]
    pub merchant_id: String,

    #[arg(long, default_value = SANDBOX_URL)]
    pub gateway_url: String,

    /// Where the gateway redirects the payer after checkout.
    #[arg(long, env = "SETTLEPAY_CALLBACK_URL")]
    pub callback_url: String,

    #[arg(long, default_value_t = 1800)]
    pub session_ttl_secs: u64,

    #[arg(long, default_value_t = 60)]
    pub sweep_interval_secs: u64,

    #[arg(long, default_value_t = 15)]
    pub gateway_timeout_secs: u64,

    #[arg(long, default_value_t = 86400)]
    pub reminder_interval_secs: u64,

    #[arg(long, default_value_t = 3)]
    pub reminder_window_days: u64,

    /// Telegram bot token. Without it notices are only logged.
    #[arg(long, env = "SETTLEPAY_BOT_TOKEN", hide_env_values = true)]
    pub bot_token: Option<String>,

    /// Customers CSV loaded before the server starts listening.
    #[arg(long, value_name = "FILE")]
    pub import: Option<PathBuf>,
}

impl ServeArgs {
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            callback_url: self.callback_url.clone(),
            session_ttl: Duration::from_secs(self.session_ttl_secs),
            gateway_timeout: self.gateway_timeout(),
        }
    }

    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn reminder_schedule(&self) -> ReminderSchedule {
        ReminderSchedule {
            every: Duration::from_secs(self.reminder_interval_secs.max(1)),
            window_days: self.reminder_window_days,
        }
    }
}
