use anyhow::Result;

#[derive(Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub notifier: NotifierConfig,
    pub sweep: SweepConfig,
}

impl AppConfig {
    pub fn new() -> Result<Self> {
        let database = DatabaseConfig {
            host: std::env::var("DATABASE_HOST")?,
            port: std::env::var("DATABASE_PORT")?.parse()?,
            username: std::env::var("DATABASE_USERNAME")?,
            password: std::env::var("DATABASE_PASSWORD")?,
            database: std::env::var("DATABASE_NAME")?,
        };
        // 通知ゲートウェイは任意設定。未設定の環境では送信せずログのみ残す
        let notifier = NotifierConfig {
            endpoint: std::env::var("NOTIFIER_ENDPOINT").ok(),
        };
        let sweep = SweepConfig {
            interval_seconds: std::env::var("SWEEP_INTERVAL_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
        };
        Ok(Self {
            database,
            notifier,
            sweep,
        })
    }
}

#[derive(Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
}

#[derive(Clone)]
pub struct NotifierConfig {
    pub endpoint: Option<String>,
}

#[derive(Clone)]
pub struct SweepConfig {
    pub interval_seconds: u64,
}
