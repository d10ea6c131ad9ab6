use clap::Parser;
use miette::{IntoDiagnostic, Result};
use settlepay::application::engine::SettlementEngine;
use settlepay::application::sweeper::{spawn_expiry_loop, spawn_reminder_loop};
use settlepay::config::{Cli, Command, ServeArgs};
use settlepay::domain::customer::Phone;
use settlepay::domain::ports::{CustomerStoreRef, NotifierRef, PaymentLedgerRef};
use settlepay::infrastructure::in_memory::{InMemoryCustomerStore, InMemoryPaymentLedger};
use settlepay::infrastructure::notifier::{LogNotifier, TELEGRAM_API, TelegramNotifier};
use settlepay::infrastructure::zarinpal::ZarinpalClient;
use settlepay::interfaces::csv::customer_reader::import_customers;
use settlepay::interfaces::csv::report_writer::ReportWriter;
use settlepay::interfaces::http::{AppState, router};
use settlepay::telemetry::init_tracing;
use std::fs::File;
use std::io;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

struct Stores {
    customers: CustomerStoreRef,
    ledger: PaymentLedgerRef,
    durable: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing("settlepay");

    let stores = open_stores(&cli)?;

    match cli.command {
        Command::Serve(args) => serve(args, stores).await?,
        Command::Import { file } => {
            let file = File::open(file).into_diagnostic()?;
            import_customers(stores.customers.as_ref(), file)
                .await
                .into_diagnostic()?;
            let customers = stores.customers.list_all().await.into_diagnostic()?;
            let stdout = io::stdout();
            let mut writer = ReportWriter::new(stdout.lock());
            writer.write_customers(&customers).into_diagnostic()?;
        }
        Command::Customers => {
            let customers = stores.customers.list_all().await.into_diagnostic()?;
            let stdout = io::stdout();
            let mut writer = ReportWriter::new(stdout.lock());
            writer.write_customers(&customers).into_diagnostic()?;
        }
        Command::History { phone } => {
            let phone = Phone::parse(&phone).into_diagnostic()?;
            let history = stores.ledger.history_for(&phone).await.into_diagnostic()?;
            let stdout = io::stdout();
            let mut writer = ReportWriter::new(stdout.lock());
            writer.write_payments(&history).into_diagnostic()?;
        }
    }

    Ok(())
}

fn open_stores(cli: &Cli) -> Result<Stores> {
    #[cfg(feature = "storage-rocksdb")]
    if let Some(db_path) = &cli.db_path {
        use settlepay::infrastructure::cipher::FieldCipher;
        use settlepay::infrastructure::rocksdb::RocksDBStore;

        let key = cli
            .encryption_key
            .as_deref()
            .ok_or_else(|| miette::miette!("--encryption-key is required with --db-path"))?;
        let cipher = FieldCipher::from_hex(key).into_diagnostic()?;
        let store = RocksDBStore::open(db_path, cipher).into_diagnostic()?;

        return Ok(Stores {
            customers: Arc::new(store.clone()),
            ledger: Arc::new(store),
            durable: true,
        });
    }

    #[cfg(not(feature = "storage-rocksdb"))]
    if cli.db_path.is_some() {
        eprintln!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }

    Ok(Stores {
        customers: Arc::new(InMemoryCustomerStore::new()),
        ledger: Arc::new(InMemoryPaymentLedger::new()),
        durable: false,
    })
}

async fn serve(args: ServeArgs, stores: Stores) -> Result<()> {
    if !stores.durable {
        warn!("serving from in-memory storage; customers and payments are lost on exit");
    }
    if let Some(path) = &args.import {
        let file = File::open(path).into_diagnostic()?;
        import_customers(stores.customers.as_ref(), file)
            .await
            .into_diagnostic()?;
    }

    let gateway = Arc::new(
        ZarinpalClient::new(&args.gateway_url, &args.merchant_id, args.gateway_timeout())
            .into_diagnostic()?,
    );
    let notifier: NotifierRef = match &args.bot_token {
        Some(token) => Arc::new(
            TelegramNotifier::new(TELEGRAM_API, token, args.gateway_timeout()).into_diagnostic()?,
        ),
        None => Arc::new(LogNotifier),
    };

    let engine = Arc::new(SettlementEngine::new(
        gateway,
        stores.ledger.clone(),
        notifier.clone(),
        args.engine_settings(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let expiry = spawn_expiry_loop(engine.clone(), args.sweep_interval(), shutdown_rx.clone());
    let reminders = spawn_reminder_loop(
        engine.clone(),
        stores.customers.clone(),
        notifier,
        args.reminder_schedule(),
        shutdown_rx,
    );

    let app = router(AppState {
        engine: engine.clone(),
        customers: stores.customers,
        ledger: stores.ledger,
    });
    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .into_diagnostic()?;
    info!(addr = %args.listen, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .into_diagnostic()?;

    let _ = shutdown_tx.send(true);
    let _ = tokio::join!(expiry, reminders);
    engine.drain_notifications().await;
    info!("shut down");
    Ok(())
}
