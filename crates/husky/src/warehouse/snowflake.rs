//! Snowflake SQL API client.
//!
//! Statements are submitted to `/api/v2/statements` with a bearer credential.
//! The API is stateless, so the session keeps the database and schema chosen
//! by `USE` statements and sends them with every request.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{ResultSet, Session, Warehouse};
use crate::config::SnowflakeConfig;
use crate::error::{
    ConnectionSnafu, DecodeSnafu, HttpClientSnafu, RequestSnafu, WarehouseError,
};
use crate::sql::Statement;

const USER_AGENT: &str = concat!("husky/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Body of a statement submission.
#[derive(Debug, Serialize, PartialEq)]
struct StatementRequest<'a> {
    statement: &'a str,
    timeout: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    database: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    schema: Option<&'a str>,
    warehouse: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct RowType {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultSetMetaData {
    #[serde(default)]
    row_type: Vec<RowType>,
    #[serde(default)]
    partition_info: Vec<serde_json::Value>,
}

/// A completed statement.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatementResponse {
    #[serde(default)]
    statement_handle: Option<String>,
    #[serde(default)]
    result_set_meta_data: ResultSetMetaData,
    #[serde(default)]
    data: Vec<Vec<Option<String>>>,
}

/// Additional result partition.
#[derive(Debug, Deserialize)]
struct PartitionResponse {
    #[serde(default)]
    data: Vec<Vec<Option<String>>>,
}

/// Body of a pending or failed statement.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusBody {
    code: Option<String>,
    sql_state: Option<String>,
    message: Option<String>,
    statement_handle: Option<String>,
}

/// What a response says about the statement.
#[derive(Debug)]
enum Progress {
    Done(StatementResponse),
    Running { handle: String },
}

/// Interpret a non-200 response body.
fn classify(status: u16, text: &str) -> Result<Progress, WarehouseError> {
    let body: Option<StatusBody> = serde_json::from_str(text).ok();

    if status == StatusCode::ACCEPTED.as_u16() {
        if let Some(handle) = body.and_then(|b| b.statement_handle) {
            return Ok(Progress::Running { handle });
        }
        return Err(WarehouseError::HttpStatus {
            status,
            body: text.to_string(),
        });
    }

    if status == StatusCode::UNAUTHORIZED.as_u16() || status == StatusCode::FORBIDDEN.as_u16() {
        let message = body
            .and_then(|b| b.message)
            .unwrap_or_else(|| text.to_string());
        return Err(WarehouseError::Authentication { message });
    }

    match body {
        Some(StatusBody {
            code: Some(code),
            message: Some(message),
            sql_state,
            ..
        }) => Err(WarehouseError::Statement {
            code,
            sql_state: sql_state.unwrap_or_default(),
            message,
        }),
        _ => Err(WarehouseError::HttpStatus {
            status,
            body: text.to_string(),
        }),
    }
}

fn base_url(config: &SnowflakeConfig) -> String {
    match config.host.as_deref().map(str::trim).filter(|h| !h.is_empty()) {
        Some(host) if host.contains("://") => host.trim_end_matches('/').to_string(),
        Some(host) => format!("https://{}", host.trim_end_matches('/')),
        None => format!("https://{}.snowflakecomputing.com", config.account.trim()),
    }
}

/// Shared HTTP state.
#[derive(Debug)]
struct Api {
    client: Client,
    config: SnowflakeConfig,
    statements_url: String,
}

/// Database and schema sent with every statement.
#[derive(Debug, Default, Clone)]
struct Context {
    database: Option<String>,
    schema: Option<String>,
}

impl Api {
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.config.password)
            .header(
                "X-Snowflake-Authorization-Token-Type",
                self.config.token_type.as_header(),
            )
            .header(reqwest::header::ACCEPT, "application/json")
    }

    fn request_body<'a>(&'a self, sql: &'a str, context: &'a Context) -> StatementRequest<'a> {
        StatementRequest {
            statement: sql,
            timeout: self.config.statement_timeout_secs,
            database: context.database.as_deref(),
            schema: context.schema.as_deref(),
            warehouse: &self.config.warehouse,
            role: self
                .config
                .role
                .as_deref()
                .map(str::trim)
                .filter(|role| !role.is_empty()),
        }
    }

    async fn send(&self, request: RequestBuilder, url: &str) -> Result<Progress, WarehouseError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .context(RequestSnafu { url })?;
        self.read(response, url).await
    }

    async fn read(&self, response: Response, url: &str) -> Result<Progress, WarehouseError> {
        let status = response.status();
        if status == StatusCode::OK {
            let body = response.json().await.context(DecodeSnafu { url })?;
            return Ok(Progress::Done(body));
        }
        let text = response.text().await.context(DecodeSnafu { url })?;
        classify(status.as_u16(), &text)
    }

    /// Submit a statement and wait for its complete result.
    async fn submit(&self, sql: &str, context: &Context) -> Result<ResultSet, WarehouseError> {
        let url = self.statements_url.as_str();
        let request = self
            .client
            .post(url)
            .json(&self.request_body(sql, context));

        let started = Instant::now();
        let mut progress = self.send(request, url).await?;
        let response = loop {
            match progress {
                Progress::Done(response) => break response,
                Progress::Running { handle } => {
                    if started.elapsed().as_secs() >= self.config.statement_timeout_secs {
                        self.cancel(&handle).await;
                        return Err(WarehouseError::Timeout {
                            handle,
                            seconds: self.config.statement_timeout_secs,
                        });
                    }
                    debug!(handle = %handle, "Statement still running");
                    tokio::time::sleep(Duration::from_millis(self.config.poll_interval_ms)).await;
                    let status_url = format!("{}/{handle}", self.statements_url);
                    progress = self
                        .send(self.client.get(&status_url), &status_url)
                        .await?;
                }
            }
        };

        self.collect(response).await
    }

    /// Fetch any additional partitions and assemble the result set.
    async fn collect(&self, response: StatementResponse) -> Result<ResultSet, WarehouseError> {
        let partitions = response.result_set_meta_data.partition_info.len();
        let mut rows = response.data;

        if partitions > 1 {
            if let Some(handle) = &response.statement_handle {
                for partition in 1..partitions {
                    rows.extend(self.fetch_partition(handle, partition).await?);
                }
            }
        }

        Ok(ResultSet {
            columns: response
                .result_set_meta_data
                .row_type
                .into_iter()
                .map(|column| column.name)
                .collect(),
            rows,
        })
    }

    /// Fetch one result partition, waiting while it is not ready yet.
    async fn fetch_partition(
        &self,
        handle: &str,
        partition: usize,
    ) -> Result<Vec<Vec<Option<String>>>, WarehouseError> {
        let url = format!("{}/{handle}?partition={partition}", self.statements_url);
        let started = Instant::now();
        loop {
            let reply = self
                .authorize(self.client.get(&url))
                .send()
                .await
                .context(RequestSnafu { url: url.as_str() })?;
            if reply.status() == StatusCode::OK {
                let part: PartitionResponse =
                    reply.json().await.context(DecodeSnafu { url: url.as_str() })?;
                return Ok(part.data);
            }

            let status = reply.status().as_u16();
            let text = reply.text().await.context(DecodeSnafu { url: url.as_str() })?;
            match classify(status, &text)? {
                Progress::Done(response) => return Ok(response.data),
                Progress::Running { .. } => {
                    if started.elapsed().as_secs() >= self.config.statement_timeout_secs {
                        return Err(WarehouseError::Timeout {
                            handle: handle.to_string(),
                            seconds: self.config.statement_timeout_secs,
                        });
                    }
                    debug!(handle, partition, "Result partition not ready");
                    tokio::time::sleep(Duration::from_millis(self.config.poll_interval_ms)).await;
                }
            }
        }
    }

    async fn cancel(&self, handle: &str) {
        let url = format!("{}/{handle}/cancel", self.statements_url);
        match self.authorize(self.client.post(&url)).send().await {
            Ok(response) if response.status().is_success() => {
                info!(handle, "Cancelled statement after timeout");
            }
            Ok(response) => {
                warn!(handle, status = %response.status(), "Failed to cancel statement");
            }
            Err(e) => warn!(handle, error = %e, "Failed to cancel statement"),
        }
    }
}

/// Snowflake account reached over the SQL API.
#[derive(Debug, Clone)]
pub struct SnowflakeWarehouse {
    api: Arc<Api>,
}

impl SnowflakeWarehouse {
    pub fn new(config: SnowflakeConfig) -> Result<Self, WarehouseError> {
        ensure!(
            !config.account.trim().is_empty(),
            ConnectionSnafu {
                message: "account must not be empty"
            }
        );

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .context(HttpClientSnafu)?;
        let statements_url = format!("{}/api/v2/statements", base_url(&config));

        Ok(Self {
            api: Arc::new(Api {
                client,
                config,
                statements_url,
            }),
        })
    }

    /// Statement endpoint this warehouse submits to.
    pub fn statements_url(&self) -> &str {
        &self.api.statements_url
    }
}

#[async_trait]
impl Warehouse for SnowflakeWarehouse {
    async fn connect(&self) -> Result<Box<dyn Session>, WarehouseError> {
        let context = Context::default();
        let version = self
            .api
            .submit("SELECT CURRENT_VERSION()", &context)
            .await?;
        info!(
            account = %self.api.config.account,
            user = %self.api.config.user,
            warehouse = %self.api.config.warehouse,
            version = version.scalar().unwrap_or("unknown"),
            "Connected to Snowflake"
        );

        Ok(Box::new(SnowflakeSession {
            api: self.api.clone(),
            context,
        }))
    }

    fn name(&self) -> &'static str {
        "snowflake"
    }
}

struct SnowflakeSession {
    api: Arc<Api>,
    context: Context,
}

#[async_trait]
impl Session for SnowflakeSession {
    async fn execute(&mut self, statement: &Statement) -> Result<ResultSet, WarehouseError> {
        let result = self.api.submit(&statement.to_sql(), &self.context).await?;

        match statement {
            Statement::UseDatabase(database) => {
                self.context = Context {
                    database: Some(database.as_str().to_string()),
                    schema: None,
                };
            }
            Statement::UseSchema { database, schema } => {
                self.context = Context {
                    database: Some(database.as_str().to_string()),
                    schema: Some(schema.as_str().to_string()),
                };
            }
            _ => {}
        }

        Ok(result)
    }

    async fn close(self: Box<Self>) -> Result<(), WarehouseError> {
        debug!(account = %self.api.config.account, "Closing Snowflake session");
        Ok(())
    }
}
