// Minimal BigQuery REST client: run one standard SQL query, read the rows.
//
// https://cloud.google.com/bigquery/docs/reference/rest/v2/jobs/query

use jiff::Timestamp;
use log::debug;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use super::auth::{default_access_token, AccessToken, AuthError};

const API_BASE_URL: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// How long the server may hold a request open waiting for the job.
const WAIT_TIMEOUT_MS: u32 = 10_000;

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("unexpected response from BigQuery: {0}")]
    Decode(serde_json::Error),

    #[error("job is not complete and has no job reference")]
    Incomplete,

    #[error("column {0} is missing from the result")]
    MissingColumn(String),

    #[error("column {column} has an invalid {kind} value '{value}'")]
    InvalidCell {
        column: String,
        kind: String,
        value: String,
    },

    #[error("json_data is not valid JSON: {0}")]
    Payload(serde_json::Error),

    #[error("json_data is {0}, expected a JSON object")]
    PayloadNotObject(&'static str),
}

/// Anything that can run a query and hand back rows.
pub trait Warehouse {
    fn query(&self, sql: &str) -> Result<Vec<Row>, QueryError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub name: String,
    pub field_type: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    cells: Vec<Cell>,
}

impl Row {
    pub fn new(cells: Vec<Cell>) -> Row {
        Row { cells }
    }

    fn cell(&self, name: &str) -> Result<&Cell, QueryError> {
        self.cells
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| QueryError::MissingColumn(name.to_string()))
    }

    /// Value of a column as a string, `None` if it is NULL.
    pub fn get_string(&self, name: &str) -> Result<Option<String>, QueryError> {
        Ok(match &self.cell(name)?.value {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            v => Some(v.to_string()),
        })
    }

    /// Value of a column as an ISO 8601 string.  TIMESTAMP cells are
    /// converted to RFC 3339 in UTC, every other type is returned as is.
    pub fn get_iso_datetime(&self, name: &str) -> Result<Option<String>, QueryError> {
        let cell = self.cell(name)?;
        let Some(raw) = self.get_string(name)? else {
            return Ok(None);
        };
        if cell.field_type != "TIMESTAMP" {
            return Ok(Some(raw));
        }
        let ts = parse_timestamp_cell(&raw).ok_or_else(|| QueryError::InvalidCell {
            column: name.to_string(),
            kind: cell.field_type.clone(),
            value: raw.clone(),
        })?;
        Ok(Some(ts.to_string()))
    }
}

/// TIMESTAMP cells are int64 microseconds when `useInt64Timestamp` is set,
/// and float seconds (e.g. `1.7172504E9`) otherwise.
fn parse_timestamp_cell(raw: &str) -> Option<Timestamp> {
    if let Ok(micros) = raw.parse::<i64>() {
        return Timestamp::from_microsecond(micros).ok();
    }
    let seconds = raw.parse::<f64>().ok()?;
    Timestamp::from_microsecond((seconds * 1e6).round() as i64).ok()
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct JobReference {
    pub project_id: String,
    pub job_id: String,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct TableSchema {
    #[serde(default)]
    pub fields: Vec<FieldSchema>,
}

#[derive(Deserialize, Debug)]
pub struct FieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
}

#[derive(Deserialize, Debug)]
pub struct TableRow {
    #[serde(default)]
    pub f: Vec<TableCell>,
}

#[derive(Deserialize, Debug)]
pub struct TableCell {
    #[serde(default)]
    pub v: Value,
}

/// Body of both `jobs.query` and `jobs.getQueryResults`.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    #[serde(default)]
    pub job_complete: bool,
    #[serde(default)]
    pub job_reference: Option<JobReference>,
    #[serde(default)]
    pub schema: Option<TableSchema>,
    #[serde(default)]
    pub rows: Vec<TableRow>,
    #[serde(default)]
    pub total_rows: Option<String>,
    #[serde(default)]
    pub page_token: Option<String>,
}

impl QueryResponse {
    pub fn total_row_count(&self) -> Option<u64> {
        self.total_rows.as_deref().and_then(|n| n.parse().ok())
    }

    /// Token of the next page, if rows the job produced are still missing.
    pub fn next_page(&self) -> Option<&str> {
        let missing = match self.total_row_count() {
            Some(total) => (self.rows.len() as u64) < total,
            None => true,
        };
        self.page_token.as_deref().filter(|_| missing)
    }

    /// Add the rows of a `getQueryResults` page.
    pub fn append_page(&mut self, page: QueryResponse) {
        self.rows.extend(page.rows);
        self.page_token = page.page_token;
        if self.schema.is_none() {
            self.schema = page.schema;
        }
        if page.total_rows.is_some() {
            self.total_rows = page.total_rows;
        }
    }

    /// Pair up the cells of each row with the schema.
    pub fn into_rows(self) -> Vec<Row> {
        let fields = self.schema.unwrap_or_default().fields;
        self.rows
            .into_iter()
            .map(|row| {
                let cells = fields
                    .iter()
                    .zip(row.f)
                    .map(|(field, cell)| Cell {
                        name: field.name.clone(),
                        field_type: field.field_type.clone(),
                        value: cell.v,
                    })
                    .collect();
                Row::new(cells)
            })
            .collect()
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
    #[serde(default)]
    status: Option<String>,
}

pub struct BigQueryClient {
    http: Client,
    project_id: String,
    token: AccessToken,
}

impl BigQueryClient {
    /// Connect with Application Default Credentials.  Queries are billed to `project_id`.
    pub fn connect(project_id: &str) -> Result<BigQueryClient, AuthError> {
        let http = Client::builder().build()?;
        let token = default_access_token(&http)?;
        Ok(BigQueryClient {
            http,
            project_id: project_id.to_string(),
            token,
        })
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = builder.bearer_auth(&self.token.token);
        match &self.token.quota_project_id {
            Some(project) => builder.header("x-goog-user-project", project),
            None => builder,
        }
    }

    fn start_query(&self, sql: &str) -> Result<QueryResponse, QueryError> {
        let url = format!("{}/projects/{}/queries", API_BASE_URL, self.project_id);
        let body = json!({
            "query": sql,
            "useLegacySql": false,
            "timeoutMs": WAIT_TIMEOUT_MS,
            "formatOptions": {"useInt64Timestamp": true},
        });
        let response = self.authorize(self.http.post(url)).json(&body).send()?;
        read_response(response)
    }

    fn wait_for_results(
        &self,
        job: &JobReference,
        page_token: Option<&str>,
    ) -> Result<QueryResponse, QueryError> {
        debug!("Waiting for job {}", job.job_id);
        let url = format!(
            "{}/projects/{}/queries/{}",
            API_BASE_URL, job.project_id, job.job_id
        );
        let mut params = vec![
            ("timeoutMs", WAIT_TIMEOUT_MS.to_string()),
            ("formatOptions.useInt64Timestamp", "true".to_string()),
        ];
        if let Some(location) = &job.location {
            params.push(("location", location.clone()));
        }
        if let Some(token) = page_token {
            params.push(("pageToken", token.to_string()));
        }
        let response = self.authorize(self.http.get(url)).query(&params).send()?;
        read_response(response)
    }
}

impl Warehouse for BigQueryClient {
    fn query(&self, sql: &str) -> Result<Vec<Row>, QueryError> {
        let mut response = self.start_query(sql)?;
        while !response.job_complete {
            let job = response.job_reference.clone().ok_or(QueryError::Incomplete)?;
            response = self.wait_for_results(&job, None)?;
        }
        while let Some(token) = response.next_page().map(str::to_string) {
            let job = response.job_reference.clone().ok_or(QueryError::Incomplete)?;
            let page = self.wait_for_results(&job, Some(&token))?;
            if page.rows.is_empty() {
                break;
            }
            response.append_page(page);
        }
        Ok(response.into_rows())
    }
}

fn read_response(response: Response) -> Result<QueryResponse, QueryError> {
    let status = response.status();
    let body = response.text()?;
    parse_response(status.as_u16(), &body)
}

fn parse_response(status: u16, body: &str) -> Result<QueryResponse, QueryError> {
    if !(200..300).contains(&status) {
        let message = match serde_json::from_str::<ErrorEnvelope>(body) {
            Ok(envelope) => match envelope.error.status {
                Some(s) => format!("{} ({})", envelope.error.message, s),
                None => envelope.error.message,
            },
            Err(_) => body.to_string(),
        };
        return Err(QueryError::Api { status, message });
    }
    serde_json::from_str(body).map_err(QueryError::Decode)
}
