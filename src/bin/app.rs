use adapter::database::connect_database_with;
use anyhow::{Context, Result};
use api::route::v1;
use kernel::notifier::NotificationKind;
use registry::AppRegistry;
use shared::config::AppConfig;
use shared::env::{which, Environment};
use std::{
    net::{Ipv4Addr, SocketAddr},
    time::Duration,
};
use tokio::net::TcpListener;
use tokio::time::sleep;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tower_http::LatencyUnit;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    init_logger()?;
    bootstrap().await
}

fn init_logger() -> Result<()> {
    let log_level = match which() {
        Environment::Development => "debug",
        Environment::Production => "info",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| log_level.into());

    let subscriber = tracing_subscriber::fmt::layer()
        .with_file(true)
        .with_line_number(true)
        .with_target(false);

    tracing_subscriber::registry()
        .with(subscriber)
        .with(env_filter)
        .try_init()?;

    Ok(())
}

async fn bootstrap() -> Result<()> {
    let app_config = AppConfig::new()?;
    let pool = connect_database_with(&app_config.database);
    let sweep_interval = app_config.sweep.interval_seconds;

    let registry = AppRegistry::new(pool, app_config);

    // 返却期限を過ぎた貸出を overdue に遷移させるバックグラウンドタスク
    {
        let registry = registry.clone();
        tokio::spawn(async move {
            overdue_sweep_loop(registry, sweep_interval).await;
        });
    }

    let app = v1::routes()
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(
                    DefaultOnResponse::new()
                        .level(Level::INFO)
                        .latency_unit(LatencyUnit::Millis),
                ),
        )
        .with_state(registry);

    let addr = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 8080);
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", addr);
    axum::serve(listener, app)
        .await
        .context("Unexpected error happened in server")
        .inspect_err(|e| {
            tracing::error!(
                error.cause_chain = ?e,error.message = %e, "Unexpected error"
            )
        })
}

// ----------------------------------------------
// 返却期限切れスイープ
// ----------------------------------------------
async fn overdue_sweep_loop(registry: AppRegistry, interval_seconds: u64) {
    loop {
        // 条件に合う貸出だけを書き換える冪等な更新なので、
        // 周期の重複実行や再起動後の再実行を気にしなくてよい
        match registry.loan_repository().mark_overdue(chrono::Utc::now()).await {
            Ok(newly_overdue) => {
                for loan in newly_overdue {
                    tracing::info!(
                        loan_id = %loan.loan_id,
                        due_date = %loan.due_date,
                        "loan transitioned to overdue"
                    );
                    let dispatcher = registry.notification_dispatcher();
                    tokio::spawn(async move {
                        let payload = serde_json::json!({
                            "loanId": loan.loan_id,
                            "bookId": loan.book_id,
                            "bookTitle": loan.book_title,
                            "dueDate": loan.due_date,
                        });
                        dispatcher
                            .notify(loan.loaned_by, NotificationKind::LoanOverdue, payload)
                            .await;
                    });
                }
            }
            Err(e) => {
                tracing::warn!(error = ?e, "overdue sweep failed");
            }
        }

        sleep(Duration::from_secs(interval_seconds)).await;
    }
}
