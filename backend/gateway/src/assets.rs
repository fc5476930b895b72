//! Locale files and the timezone table.

use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Json, Response},
};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::error::ApiError;
use crate::server::GatewayState;

pub const FALLBACK_LOCALE: &str = "en";

static LANG_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_-]{1,32}$").unwrap());

/// Zones offered per country code; anything else gets `UTC`.
pub fn timezones_for(country: &str) -> Vec<&'static str> {
    match country.to_ascii_uppercase().as_str() {
        "US" => vec![
            "America/New_York",
            "America/Los_Angeles",
            "America/Chicago",
            "America/Denver",
        ],
        "CA" => vec!["America/Toronto", "America/Vancouver"],
        "DE" => vec!["Europe/Berlin"],
        "FR" => vec!["Europe/Paris"],
        "JP" => vec!["Asia/Tokyo"],
        "AU" => vec!["Australia/Sydney", "Australia/Melbourne"],
        _ => vec!["UTC"],
    }
}

pub async fn timezones(Path(country): Path<String>) -> Json<Vec<&'static str>> {
    Json(timezones_for(&country))
}

/// `GET /api/locale/:lang`: `<locale_dir>/<lang>.json`, falling back to
/// English when the name is malformed or the file is missing.
pub async fn locale(
    State(state): State<GatewayState>,
    Path(lang): Path<String>,
) -> Result<Response, ApiError> {
    let dir = &state.settings.locale_dir;
    let requested = LANG_PATTERN
        .is_match(&lang)
        .then(|| dir.join(format!("{lang}.json")))
        .filter(|p| p.is_file());

    let path = match requested {
        Some(path) => path,
        None => {
            debug!(lang = %lang, "Locale unavailable; serving fallback");
            dir.join(format!("{FALLBACK_LOCALE}.json"))
        }
    };

    let body = tokio::fs::read(&path)
        .await
        .map_err(|_| ApiError::NotFound(format!("locale '{lang}'")))?;
    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}
