use async_trait::async_trait;
use kernel::model::id::UserId;
use kernel::notifier::{NotificationDispatcher, NotificationKind};
use serde_json::Value;
use shared::config::NotifierConfig;

// 通知ゲートウェイ（SMS・メール配信を担う外部サービス）への HTTP クライアント。
// 送信は best-effort で、失敗はログに残すだけでリトライしない
pub struct NotificationDispatcherImpl {
    client: reqwest::Client,
    endpoint: Option<String>,
}

impl NotificationDispatcherImpl {
    pub fn new(cfg: &NotifierConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: cfg.endpoint.clone(),
        }
    }
}

#[async_trait]
impl NotificationDispatcher for NotificationDispatcherImpl {
    async fn notify(&self, user_id: UserId, kind: NotificationKind, payload: Value) {
        // エンドポイント未設定の環境（開発など）では送信しない
        let Some(endpoint) = &self.endpoint else {
            tracing::info!(%user_id, ?kind, "notification skipped: no endpoint configured");
            return;
        };

        let body = serde_json::json!({
            "userId": user_id,
            "kind": kind,
            "payload": payload,
        });

        match self.client.post(endpoint).json(&body).send().await {
            Ok(res) if res.status().is_success() => {
                tracing::info!(%user_id, ?kind, "notification dispatched");
            }
            Ok(res) => {
                tracing::warn!(
                    %user_id,
                    ?kind,
                    status = %res.status(),
                    "notification gateway returned an error"
                );
            }
            Err(e) => {
                tracing::warn!(
                    %user_id,
                    ?kind,
                    error = %e,
                    "failed to reach notification gateway"
                );
            }
        }
    }
}
