//! Built-in capabilities.

use super::{Capability, ToolDefinition};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Mutex;

// ============================================================
// get_weather
// ============================================================

/// Current conditions via the Open-Meteo public API (keyless)
pub struct WeatherTool {
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct WeatherArgs {
    location: String,
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    results: Vec<GeocodeHit>,
}

#[derive(Debug, Deserialize)]
struct GeocodeHit {
    name: String,
    latitude: f64,
    longitude: f64,
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    current_weather: CurrentWeather,
}

#[derive(Debug, Deserialize)]
struct CurrentWeather {
    temperature: f64,
    windspeed: f64,
    weathercode: u32,
}

impl WeatherTool {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    async fn geocode(&self, location: &str) -> Result<GeocodeHit, String> {
        let response: GeocodeResponse = self
            .http
            .get("https://geocoding-api.open-meteo.com/v1/search")
            .query(&[("name", location), ("count", "1")])
            .send()
            .await
            .map_err(|e| format!("geocoding failed: {e}"))?
            .json()
            .await
            .map_err(|e| format!("geocoding returned unexpected data: {e}"))?;

        response
            .results
            .into_iter()
            .next()
            .ok_or_else(|| format!("no such place: {location}"))
    }
}

#[async_trait]
impl Capability for WeatherTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "get_weather".to_string(),
            description: "Look up current weather conditions for a named location.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "location": {
                        "type": "string",
                        "description": "City or place name, e.g. 'Lisbon'"
                    }
                },
                "required": ["location"]
            }),
        }
    }

    async fn run(&self, arguments: Value) -> Result<Value, String> {
        let args: WeatherArgs =
            serde_json::from_value(arguments).map_err(|e| format!("invalid arguments: {e}"))?;

        let place = self.geocode(&args.location).await?;

        let forecast: ForecastResponse = self
            .http
            .get("https://api.open-meteo.com/v1/forecast")
            .query(&[
                ("latitude", place.latitude.to_string()),
                ("longitude", place.longitude.to_string()),
                ("current_weather", "true".to_string()),
            ])
            .send()
            .await
            .map_err(|e| format!("weather lookup failed: {e}"))?
            .json()
            .await
            .map_err(|e| format!("weather service returned unexpected data: {e}"))?;

        let location = match place.country {
            Some(country) => format!("{}, {country}", place.name),
            None => place.name,
        };

        Ok(json!({
            "location": location,
            "temperatureC": forecast.current_weather.temperature,
            "windKph": forecast.current_weather.windspeed,
            "conditions": describe_weather_code(forecast.current_weather.weathercode),
        }))
    }
}

/// WMO weather interpretation codes, coarsely bucketed
fn describe_weather_code(code: u32) -> &'static str {
    match code {
        0 => "clear sky",
        1..=3 => "partly cloudy",
        45 | 48 => "fog",
        51..=57 => "drizzle",
        61..=67 => "rain",
        71..=77 => "snow",
        80..=82 => "rain showers",
        85 | 86 => "snow showers",
        95..=99 => "thunderstorm",
        _ => "unknown conditions",
    }
}

// ============================================================
// web_search
// ============================================================

/// Web search via a SearxNG-compatible endpoint
pub struct SearchTool {
    http: reqwest::Client,
    endpoint: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
}

#[derive(Debug, Deserialize)]
struct SearxResponse {
    #[serde(default)]
    results: Vec<SearxHit>,
}

#[derive(Debug, Deserialize)]
struct SearxHit {
    title: String,
    url: String,
    #[serde(default)]
    content: String,
}

const MAX_SEARCH_HITS: usize = 5;

impl SearchTool {
    pub fn new(http: reqwest::Client, endpoint: Option<String>) -> Self {
        Self { http, endpoint }
    }
}

#[async_trait]
impl Capability for SearchTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "web_search".to_string(),
            description: "Search the web and return the top results.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Search query"
                    }
                },
                "required": ["query"]
            }),
        }
    }

    async fn run(&self, arguments: Value) -> Result<Value, String> {
        let args: SearchArgs =
            serde_json::from_value(arguments).map_err(|e| format!("invalid arguments: {e}"))?;

        let endpoint = self
            .endpoint
            .as_deref()
            .ok_or("search endpoint not configured (set SEARCH_API_URL)")?;

        let response: SearxResponse = self
            .http
            .get(format!("{}/search", endpoint.trim_end_matches('/')))
            .query(&[("q", args.query.as_str()), ("format", "json")])
            .send()
            .await
            .map_err(|e| format!("search failed: {e}"))?
            .json()
            .await
            .map_err(|e| format!("search returned unexpected data: {e}"))?;

        let results: Vec<Value> = response
            .results
            .into_iter()
            .take(MAX_SEARCH_HITS)
            .map(|hit| {
                json!({
                    "title": hit.title,
                    "url": hit.url,
                    "snippet": hit.content,
                })
            })
            .collect();

        Ok(json!({ "results": results }))
    }
}

// ============================================================
// query_database
// ============================================================

/// SQL against a per-process scratch SQLite database. The model owns the
/// schema; the server only brokers statements.
pub struct DatabaseTool {
    conn: Mutex<rusqlite::Connection>,
}

#[derive(Debug, Deserialize)]
struct DatabaseArgs {
    sql: String,
}

impl DatabaseTool {
    /// Open the scratch database, in memory when no path is configured.
    pub fn open(path: Option<&Path>) -> Result<Self, String> {
        let conn = match path {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
                }
                rusqlite::Connection::open(path).map_err(|e| e.to_string())?
            }
            None => rusqlite::Connection::open_in_memory().map_err(|e| e.to_string())?,
        };
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn execute(&self, sql: &str) -> Result<Value, String> {
        let conn = self.conn.lock().expect("database mutex poisoned");

        let head = sql.trim_start().to_ascii_lowercase();
        if head.starts_with("select") || head.starts_with("with") || head.starts_with("pragma") {
            let mut stmt = conn.prepare(sql).map_err(|e| e.to_string())?;
            let columns: Vec<String> =
                stmt.column_names().iter().map(|c| (*c).to_string()).collect();

            let mut rows = Vec::new();
            let mut query = stmt.query([]).map_err(|e| e.to_string())?;
            while let Some(row) = query.next().map_err(|e| e.to_string())? {
                let mut object = serde_json::Map::new();
                for (i, column) in columns.iter().enumerate() {
                    object.insert(column.clone(), sql_value_to_json(row, i)?);
                }
                rows.push(Value::Object(object));
            }

            Ok(json!({ "rows": rows, "rowsAffected": 0 }))
        } else {
            let affected = conn.execute(sql, []).map_err(|e| e.to_string())?;
            Ok(json!({ "rows": [], "rowsAffected": affected }))
        }
    }
}

fn sql_value_to_json(row: &rusqlite::Row<'_>, index: usize) -> Result<Value, String> {
    use rusqlite::types::ValueRef;

    let value = row.get_ref(index).map_err(|e| e.to_string())?;
    Ok(match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(t) => Value::from(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::from(format!("<blob {} bytes>", b.len())),
    })
}

#[async_trait]
impl Capability for DatabaseTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "query_database".to_string(),
            description: "Run SQL against the session scratch database. \
                          Supports CREATE, INSERT, UPDATE, DELETE and SELECT."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "sql": {
                        "type": "string",
                        "description": "SQL statement to execute"
                    }
                },
                "required": ["sql"]
            }),
        }
    }

    async fn run(&self, arguments: Value) -> Result<Value, String> {
        let args: DatabaseArgs =
            serde_json::from_value(arguments).map_err(|e| format!("invalid arguments: {e}"))?;
        self.execute(&args.sql)
    }
}
