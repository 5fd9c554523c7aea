#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::sync::{Mutex, PoisonError};

use serde_json::{json, Value};
use tracing::{debug, info};
use url::Url;

use crate::auth::{ServiceAccountKey, SheetsCredentials, TokenSource};
use crate::outbound::{non_empty, outbound_agent, parse_timeout_ms, storage_error_from_ureq};
use crate::store::{StorageError, StoreOp, TableHandle, TabularStore};

pub const SHEETS_API_BASE_DEFAULT: &str = "https://sheets.googleapis.com/v4";
pub const DRIVE_API_BASE_DEFAULT: &str = "https://www.googleapis.com/drive/v3";
const SPREADSHEET_MIME_TYPE: &str = "application/vnd.google-apps.spreadsheet";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpreadsheetRef {
    Id(String),
    /// Resolved once through the Drive API, as the first spreadsheet with that title.
    Title(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetsStoreConfig {
    pub spreadsheet: SpreadsheetRef,
    pub credentials: SheetsCredentials,
    pub api_base: String,
    pub drive_api_base: String,
    pub timeout_ms: u64,
}

impl SheetsStoreConfig {
    pub fn from_env() -> Result<Self, String> {
        Self::from_var_map(|key| env::var(key).ok())
    }

    /// A fixed access token (inline or from a file) overrides the service-account key.
    pub fn from_var_map<F>(get: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let spreadsheet = match (
            non_empty(get("SHOPSYNC_SPREADSHEET_ID")),
            non_empty(get("SHOPSYNC_SPREADSHEET_TITLE")),
        ) {
            (Some(id), _) => SpreadsheetRef::Id(id),
            (None, Some(title)) => SpreadsheetRef::Title(title),
            (None, None) => {
                return Err(
                    "SHOPSYNC_SPREADSHEET_ID or SHOPSYNC_SPREADSHEET_TITLE must be set for the sheets backend"
                        .to_string(),
                )
            }
        };
        let credentials = credentials_from_vars(&get)?;
        let api_base = non_empty(get("SHOPSYNC_SHEETS_API_BASE"))
            .unwrap_or_else(|| SHEETS_API_BASE_DEFAULT.to_string());
        Url::parse(&api_base).map_err(|err| format!("invalid SHOPSYNC_SHEETS_API_BASE: {err}"))?;
        let drive_api_base = non_empty(get("SHOPSYNC_DRIVE_API_BASE"))
            .unwrap_or_else(|| DRIVE_API_BASE_DEFAULT.to_string());
        Url::parse(&drive_api_base)
            .map_err(|err| format!("invalid SHOPSYNC_DRIVE_API_BASE: {err}"))?;
        Ok(Self {
            spreadsheet,
            credentials,
            api_base,
            drive_api_base,
            timeout_ms: parse_timeout_ms(get("SHOPSYNC_OUTBOUND_TIMEOUT_MS")),
        })
    }
}

fn credentials_from_vars<F>(get: &F) -> Result<SheetsCredentials, String>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(token) = non_empty(get("SHOPSYNC_SHEETS_ACCESS_TOKEN")) {
        return Ok(SheetsCredentials::AccessToken(token));
    }
    if let Some(path) = non_empty(get("SHOPSYNC_SHEETS_ACCESS_TOKEN_FILE")) {
        let raw = fs::read_to_string(&path)
            .map_err(|err| format!("failed to read access token file '{path}': {err}"))?;
        let token =
            non_empty(Some(raw)).ok_or_else(|| format!("access token file '{path}' is empty"))?;
        return Ok(SheetsCredentials::AccessToken(token));
    }
    let path = non_empty(get("SHOPSYNC_SHEETS_CREDENTIALS_FILE")).ok_or_else(|| {
        "SHOPSYNC_SHEETS_CREDENTIALS_FILE (or an access token override) must be set".to_string()
    })?;
    Ok(SheetsCredentials::ServiceAccount(ServiceAccountKey::from_file(&path)?))
}

/// Google Sheets v4 REST backend. One agent and one token source for the life of the process.
pub struct SheetsTabularStore {
    config: SheetsStoreConfig,
    agent: ureq::Agent,
    tokens: TokenSource,
    spreadsheet_id: Mutex<Option<String>>,
    sheet_ids: Mutex<BTreeMap<String, u64>>,
}

impl SheetsTabularStore {
    pub fn new(config: SheetsStoreConfig) -> Self {
        let resolved = match &config.spreadsheet {
            SpreadsheetRef::Id(id) => Some(id.clone()),
            SpreadsheetRef::Title(_) => None,
        };
        Self {
            agent: outbound_agent(config.timeout_ms),
            tokens: TokenSource::new(config.credentials.clone()),
            spreadsheet_id: Mutex::new(resolved),
            sheet_ids: Mutex::new(BTreeMap::new()),
            config,
        }
    }

    fn spreadsheet_id(&self) -> Result<String, StorageError> {
        if let Some(id) = self
            .spreadsheet_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return Ok(id);
        }
        let title = match &self.config.spreadsheet {
            SpreadsheetRef::Title(title) => title.as_str(),
            SpreadsheetRef::Id(id) => return Ok(id.clone()),
        };
        let url = drive_files_url(&self.config.drive_api_base, title)?;
        let body = self.call(
            StoreOp::OpenSpreadsheet,
            "",
            self.agent.get(url.as_str()),
            None,
        )?;
        let id = first_drive_file_id(&body).ok_or_else(|| StorageError::SpreadsheetMissing {
            title: title.to_string(),
        })?;
        info!(title, spreadsheet_id = %id, "opened spreadsheet by title");
        *self
            .spreadsheet_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(id.clone());
        Ok(id)
    }

    fn spreadsheet_url(&self, tail: &[&str]) -> Result<Url, StorageError> {
        spreadsheet_url(&self.config.api_base, &self.spreadsheet_id()?, tail)
    }

    /// A 401 with refreshable credentials drops the cached token and retries once.
    fn call(
        &self,
        op: StoreOp,
        table: &str,
        request: ureq::Request,
        body: Option<Value>,
    ) -> Result<Value, StorageError> {
        match self.send(op, table, request.clone(), body.clone()) {
            Err(StorageError::Rejected { status: 401, .. }) if self.tokens.invalidate() => {
                debug!(op = op.as_str(), table, "access token rejected, refreshing");
                self.send(op, table, request, body)
            }
            other => other,
        }
    }

    fn send(
        &self,
        op: StoreOp,
        table: &str,
        request: ureq::Request,
        body: Option<Value>,
    ) -> Result<Value, StorageError> {
        let token = self.tokens.bearer(&self.agent)?;
        let request = request
            .set("Authorization", &format!("Bearer {token}"))
            .set("Accept", "application/json");
        let result = match body {
            Some(body) => request.send_json(body),
            None => request.call(),
        };
        let response = result.map_err(|err| storage_error_from_ureq(op, table, err))?;
        serde_json::from_reader(response.into_reader()).map_err(|err| {
            StorageError::MalformedResponse {
                op,
                detail: err.to_string(),
            }
        })
    }

    fn lookup_sheet_ids(&self) -> Result<BTreeMap<String, u64>, StorageError> {
        let mut url = self.spreadsheet_url(&[])?;
        url.query_pairs_mut()
            .append_pair("fields", "sheets.properties(sheetId,title)");
        let body = self.call(
            StoreOp::EnsureTable,
            "",
            self.agent.get(url.as_str()),
            None,
        )?;
        let ids = parse_sheet_properties(&body);
        *self.sheet_ids.lock().unwrap_or_else(PoisonError::into_inner) = ids.clone();
        Ok(ids)
    }

    fn cached_sheet_id(&self, name: &str) -> Option<u64> {
        self.sheet_ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .copied()
    }

    fn batch_update(&self, op: StoreOp, table: &str, request: Value) -> Result<Value, StorageError> {
        let url = self.spreadsheet_url(&[":batchUpdate"])?;
        self.call(
            op,
            table,
            self.agent.post(url.as_str()),
            Some(batch_update_body(request)),
        )
    }
}

impl TabularStore for SheetsTabularStore {
    fn backend_name(&self) -> &'static str {
        "sheets"
    }

    fn ensure_table_exists(&self, name: &str) -> Result<TableHandle, StorageError> {
        if let Some(sheet_id) = self.cached_sheet_id(name) {
            return Ok(TableHandle::new(name, Some(sheet_id)));
        }
        if let Some(sheet_id) = self.lookup_sheet_ids()?.get(name).copied() {
            return Ok(TableHandle::new(name, Some(sheet_id)));
        }
        debug!(table = name, "creating missing sheet");
        let reply = self.batch_update(
            StoreOp::EnsureTable,
            name,
            add_sheet_request(name),
        )?;
        let sheet_id = reply
            .pointer("/replies/0/addSheet/properties/sheetId")
            .and_then(Value::as_u64)
            .ok_or_else(|| StorageError::MalformedResponse {
                op: StoreOp::EnsureTable,
                detail: "addSheet reply carried no sheetId".to_string(),
            })?;
        self.sheet_ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), sheet_id);
        Ok(TableHandle::new(name, Some(sheet_id)))
    }

    fn read_all_rows(&self, table: &TableHandle) -> Result<Vec<Vec<String>>, StorageError> {
        let sheet = quoted_sheet(&table.name);
        let mut url = self.spreadsheet_url(&["values", sheet.as_str()])?;
        url.query_pairs_mut()
            .append_pair("majorDimension", "ROWS")
            .append_pair("valueRenderOption", "FORMATTED_VALUE");
        let body = self.call(
            StoreOp::ReadAllRows,
            &table.name,
            self.agent.get(url.as_str()),
            None,
        )?;
        Ok(parse_value_rows(&body))
    }

    fn write_row_range(
        &self,
        table: &TableHandle,
        row: usize,
        cells: &[String],
    ) -> Result<(), StorageError> {
        let range = a1_row_start(&table.name, row);
        let mut url = self.spreadsheet_url(&["values", range.as_str()])?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");
        self.call(
            StoreOp::WriteRowRange,
            &table.name,
            self.agent.put(url.as_str()),
            Some(values_update_body(&range, cells)),
        )?;
        Ok(())
    }

    fn append_row(&self, table: &TableHandle, cells: &[String]) -> Result<(), StorageError> {
        let range = format!("{}:append", a1_row_start(&table.name, 0));
        let mut url = self.spreadsheet_url(&["values", range.as_str()])?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "RAW")
            .append_pair("insertDataOption", "INSERT_ROWS");
        self.call(
            StoreOp::AppendRow,
            &table.name,
            self.agent.post(url.as_str()),
            Some(values_append_body(cells)),
        )?;
        Ok(())
    }

    fn delete_row(&self, table: &TableHandle, row: usize) -> Result<(), StorageError> {
        let sheet_id = match table.sheet_id.or_else(|| self.cached_sheet_id(&table.name)) {
            Some(id) => id,
            None => self
                .lookup_sheet_ids()?
                .get(&table.name)
                .copied()
                .ok_or_else(|| StorageError::TableMissing {
                    table: table.name.clone(),
                })?,
        };
        self.batch_update(
            StoreOp::DeleteRow,
            &table.name,
            delete_row_request(sheet_id, row),
        )?;
        Ok(())
    }
}

/// `tail` entries starting with ':' are glued onto the spreadsheet id (`{id}:batchUpdate`).
fn spreadsheet_url(api_base: &str, spreadsheet_id: &str, tail: &[&str]) -> Result<Url, StorageError> {
    let mut url = Url::parse(api_base).map_err(|err| StorageError::Unavailable {
        op: StoreOp::EnsureTable,
        table: String::new(),
        detail: format!("invalid api base: {err}"),
    })?;
    {
        let mut segments = url.path_segments_mut().map_err(|_| StorageError::Unavailable {
            op: StoreOp::EnsureTable,
            table: String::new(),
            detail: "api base cannot carry a path".to_string(),
        })?;
        segments.pop_if_empty().push("spreadsheets");
        match tail.first() {
            Some(suffix) if suffix.starts_with(':') => {
                segments.push(&format!("{spreadsheet_id}{suffix}"));
                segments.extend(&tail[1..]);
            }
            _ => {
                segments.push(spreadsheet_id);
                segments.extend(tail);
            }
        }
    }
    Ok(url)
}

fn batch_update_body(request: Value) -> Value {
    json!({ "requests": [request] })
}

fn add_sheet_request(name: &str) -> Value {
    json!({ "addSheet": { "properties": { "title": name } } })
}

fn values_update_body(range: &str, cells: &[String]) -> Value {
    json!({ "range": range, "majorDimension": "ROWS", "values": [cells] })
}

fn values_append_body(cells: &[String]) -> Value {
    json!({ "majorDimension": "ROWS", "values": [cells] })
}

/// Removes absolute row `row`; the range is half-open.
fn delete_row_request(sheet_id: u64, row: usize) -> Value {
    json!({
        "deleteDimension": {
            "range": {
                "sheetId": sheet_id,
                "dimension": "ROWS",
                "startIndex": row,
                "endIndex": row + 1,
            }
        }
    })
}

fn drive_title_query(title: &str) -> String {
    let escaped = title.replace('\\', "\\\\").replace('\'', "\\'");
    format!("name = '{escaped}' and mimeType = '{SPREADSHEET_MIME_TYPE}' and trashed = false")
}

fn drive_files_url(drive_api_base: &str, title: &str) -> Result<Url, StorageError> {
    let mut url = Url::parse(drive_api_base).map_err(|err| StorageError::Unavailable {
        op: StoreOp::OpenSpreadsheet,
        table: String::new(),
        detail: format!("invalid drive api base: {err}"),
    })?;
    url.path_segments_mut()
        .map_err(|_| StorageError::Unavailable {
            op: StoreOp::OpenSpreadsheet,
            table: String::new(),
            detail: "drive api base cannot carry a path".to_string(),
        })?
        .pop_if_empty()
        .push("files");
    url.query_pairs_mut()
        .append_pair("q", &drive_title_query(title))
        .append_pair("fields", "files(id,name)")
        .append_pair("pageSize", "1")
        .append_pair("supportsAllDrives", "true")
        .append_pair("includeItemsFromAllDrives", "true");
    Ok(url)
}

fn first_drive_file_id(body: &Value) -> Option<String> {
    body.get("files")?
        .as_array()?
        .iter()
        .find_map(|file| file.get("id").and_then(Value::as_str))
        .map(str::to_string)
}

fn quoted_sheet(name: &str) -> String {
    format!("'{}'", name.replace('\'', "''"))
}

/// A1 anchor for column A of the absolute row `row` (0-based, so row 0 is `A1`).
fn a1_row_start(name: &str, row: usize) -> String {
    format!("{}!A{}", quoted_sheet(name), row + 1)
}

fn parse_value_rows(body: &Value) -> Vec<Vec<String>> {
    let Some(rows) = body.get("values").and_then(Value::as_array) else {
        return Vec::new();
    };
    rows.iter()
        .map(|row| {
            row.as_array()
                .map(|cells| cells.iter().map(cell_text).collect())
                .unwrap_or_default()
        })
        .collect()
}

fn cell_text(cell: &Value) -> String {
    match cell {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn parse_sheet_properties(body: &Value) -> BTreeMap<String, u64> {
    let mut out = BTreeMap::new();
    let Some(sheets) = body.get("sheets").and_then(Value::as_array) else {
        return out;
    };
    for sheet in sheets {
        let props = sheet.get("properties");
        let title = props.and_then(|p| p.get("title")).and_then(Value::as_str);
        let sheet_id = props.and_then(|p| p.get("sheetId")).and_then(Value::as_u64);
        if let (Some(title), Some(sheet_id)) = (title, sheet_id) {
            out.insert(title.to_string(), sheet_id);
        }
    }
    out
}
