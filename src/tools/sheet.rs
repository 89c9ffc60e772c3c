use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde_json::{Value, json};
use tracing::{error, info};

use super::{ToolError, ToolHandler};
use crate::config::SheetConfig;

pub const SHEET_TOOL_NAME: &str = "append_sheet_row";

/// Appends one row to a spreadsheet through an append webhook.
#[derive(Debug, Clone)]
pub struct SheetRowTool {
    cfg: SheetConfig,
    http: reqwest::Client,
}

impl SheetRowTool {
    pub fn new(cfg: SheetConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .context("build sheet http client")?;
        Ok(Self { cfg, http })
    }

    async fn append(&self, row: &[String]) -> Result<()> {
        let mut req = self
            .http
            .post(&self.cfg.webhook_url)
            .json(&json!({ "values": [row] }));
        if let Some(token) = &self.cfg.token {
            req = req.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let resp = req.send().await.context("send sheet append")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("sheet append error: {} - {}", status, text);
        }
        Ok(())
    }
}

/// Cells in `columns` order; absent or null arguments become empty cells.
pub fn build_row(columns: &[String], args: &Value) -> Vec<String> {
    columns
        .iter()
        .map(|col| match args.get(col) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        })
        .collect()
}

#[async_trait]
impl ToolHandler for SheetRowTool {
    async fn invoke(&self, args: &Value) -> Result<String, ToolError> {
        if !args.is_object() {
            return Err(ToolError::InvalidArguments(
                "expected an object of column values".into(),
            ));
        }
        let row = build_row(&self.cfg.columns, args);
        match self.append(&row).await {
            Ok(()) => {
                info!(cells = row.len(), "appended sheet row");
                Ok(json!({ "ok": true, "row": row }).to_string())
            }
            Err(e) => {
                error!(error = %format!("{e:#}"), "sheet append failed");
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httptest::{Expectation, Server, matchers::*, responders::*};
    use serde_json::Value;

    fn tool_for(server: &Server, token: Option<&str>) -> SheetRowTool {
        SheetRowTool::new(SheetConfig {
            webhook_url: server.url_str("/append"),
            token: token.map(String::from),
            columns: vec!["name".into(), "email".into(), "age".into()],
        })
        .unwrap()
    }

    #[test]
    fn row_follows_column_order_and_blanks_missing() {
        let columns = vec!["name".to_string(), "email".to_string(), "age".to_string()];
        let row = build_row(&columns, &json!({"age": 31, "name": "Lan", "email": null}));
        assert_eq!(row, vec!["Lan", "", "31"]);
    }

    #[tokio::test]
    async fn posts_row_to_webhook() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/append"),
                request::headers(contains(("authorization", "Bearer sheet-token"))),
                request::body(json_decoded(eq(json!({"values": [["Lan", "lan@example.com", ""]]})))),
            ])
            .respond_with(status_code(200)),
        );

        let out = tool_for(&server, Some("sheet-token"))
            .invoke(&json!({"name": "Lan", "email": "lan@example.com"}))
            .await
            .unwrap();
        let v: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["ok"], json!(true));
        assert_eq!(v["row"], json!(["Lan", "lan@example.com", ""]));
    }

    #[tokio::test]
    async fn webhook_failure_is_an_error() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/append"))
                .respond_with(status_code(502).body("bad gateway")),
        );

        let err = tool_for(&server, None)
            .invoke(&json!({"name": "Lan"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Failed(_)));
        assert!(err.to_string().contains("502"));
    }

    #[tokio::test]
    async fn non_object_args_rejected() {
        let server = Server::run();
        let err = tool_for(&server, None)
            .invoke(&json!(["Lan"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
