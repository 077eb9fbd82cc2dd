//! Best-effort conversion of raw backend status payloads into [`ProgressUpdate`]s.
//!
//! The backend reports progress as JSON snapshots on the poll endpoint and as
//! loosely formatted text lines on the push stream. Nothing in here fails:
//! text that matches no known convention becomes an `unknown`-stage update
//! carrying the original text as its label.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::catalog;
use crate::progress::{ratio, ProgressUpdate, StageKey};

const GENERIC_FAILURE: &str = "Analysis failed";
const GENERIC_SUCCESS: &str = "Analysis complete";

const COMPLETE_STAGES: &[&str] = &["complete", "completed", "done", "finished"];
const ERROR_STAGES: &[&str] = &["error", "failed"];

/// Normalizes one raw payload.
pub fn normalize(raw: &str) -> ProgressUpdate {
    let text = raw.trim();
    if text.starts_with('{') {
        if let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(text) {
            return normalize_structured(&fields, text);
        }
    }
    normalize_text(text, raw)
}

fn normalize_structured(fields: &Map<String, Value>, raw: &str) -> ProgressUpdate {
    let stage = str_field(fields, &["stage"]);
    let message = str_field(fields, &["message"]);
    let status = str_field(fields, &["status"]).map(str::to_ascii_lowercase);

    let is_error_stage = stage.is_some_and(|s| is_one_of(s, ERROR_STAGES));
    if is_error_stage || status.as_deref() == Some("error") {
        let detail = str_field(fields, &["detail", "message", "error"])
            .map(strip_error_marker)
            .filter(|d| !d.is_empty())
            .unwrap_or(GENERIC_FAILURE);
        return ProgressUpdate::failure(detail);
    }
    if let Some(detail) = message.and_then(error_sentinel) {
        return ProgressUpdate::failure(detail);
    }

    let is_complete_stage = stage.is_some_and(|s| is_one_of(s, COMPLETE_STAGES));
    if is_complete_stage || status.as_deref() == Some("success") {
        let result = fields
            .get("stats")
            .or_else(|| fields.get("result"))
            .filter(|v| !v.is_null())
            .cloned();
        return ProgressUpdate::success(message.unwrap_or(GENERIC_SUCCESS), result);
    }

    let Some(stage) = stage else {
        return match message {
            Some(message) => normalize_text(message.trim(), message),
            None => ProgressUpdate::unrecognized(raw),
        };
    };

    if stage.eq_ignore_ascii_case("idle") {
        return ProgressUpdate::unrecognized(message.unwrap_or(stage));
    }

    let key = StageKey::new(stage);
    let counters = Counters {
        current: u64_field(fields, &["progress", "current"]),
        total: u64_field(fields, &["total"]),
        percent: fields
            .get("percentage")
            .or_else(|| fields.get("percent"))
            .and_then(Value::as_f64),
    };
    staged_update(key, message.unwrap_or_default(), counters)
}

/// Matches the trimmed `text`; an unrecognized frame keeps `original` as is.
fn normalize_text(text: &str, original: &str) -> ProgressUpdate {
    if let Some(detail) = error_sentinel(text) {
        return ProgressUpdate::failure(detail);
    }
    if completion_sentinel(text) {
        return ProgressUpdate::success(GENERIC_SUCCESS, None);
    }

    if let Some(caps) = bracket_pattern().captures(text) {
        let key = StageKey::new(&caps["stage"]);
        let (message, counters) = split_counters(&caps["rest"]);
        return finish_text_update(key, message, counters);
    }

    if let Some(caps) = console_pattern().captures(text) {
        let key = StageKey::new(&caps["stage"]);
        let (message, counters) = split_counters(&caps["rest"]);
        // Without counters only catalog stages are trusted; anything else
        // is likely prose that happens to contain a colon.
        if counters.current.is_some() || counters.percent.is_some() || catalog::lookup(&key).is_some() {
            return finish_text_update(key, message, counters);
        }
    }

    ProgressUpdate::unrecognized(original)
}

fn finish_text_update(key: StageKey, message: &str, counters: Counters) -> ProgressUpdate {
    if is_one_of(key.as_str(), ERROR_STAGES) {
        let detail = strip_error_marker(message);
        return ProgressUpdate::failure(if detail.is_empty() { GENERIC_FAILURE } else { detail });
    }
    if is_one_of(key.as_str(), COMPLETE_STAGES) {
        let label = if message.is_empty() { GENERIC_SUCCESS } else { message };
        return ProgressUpdate::success(label, None);
    }
    staged_update(key, message, counters)
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    current: Option<u64>,
    total: Option<u64>,
    percent: Option<f64>,
}

impl Counters {
    /// Progress within the current phase, if the message expressed any.
    fn sub_progress(&self) -> Option<f64> {
        if let Some(percent) = self.percent {
            return Some(percent / 100.0);
        }
        match (self.current, self.total) {
            (Some(current), Some(total)) => ratio(current, total),
            _ => None,
        }
    }
}

fn staged_update(key: StageKey, message: &str, counters: Counters) -> ProgressUpdate {
    let sub = counters.sub_progress();
    let fraction = match catalog::lookup(&key) {
        Some(info) => info.overall(sub.unwrap_or(0.0)),
        None => sub.unwrap_or(0.0),
    };
    let label = catalog::label_for(&key, message);
    let icon = catalog::icon_for(&key);
    ProgressUpdate::in_progress(key, label, icon, fraction)
}

/// Splits a trailing `(current/total)`, `current/total` or `NN%` off a sub-message.
fn split_counters(rest: &str) -> (&str, Counters) {
    let rest = rest.trim();
    if let Some(caps) = counter_pattern().captures(rest) {
        let current = caps["current"].parse().ok();
        let total = caps["total"].parse().ok();
        let start = caps.get(0).map_or(rest.len(), |m| m.start());
        let counters = Counters { current, total, percent: None };
        return (rest[..start].trim(), counters);
    }
    if let Some(caps) = percent_pattern().captures(rest) {
        let percent = caps["percent"].parse().ok();
        let start = caps.get(0).map_or(rest.len(), |m| m.start());
        let counters = Counters { percent, ..Counters::default() };
        return (rest[..start].trim(), counters);
    }
    (rest, Counters::default())
}

/// Detail text following an error marker anywhere in `text`.
fn error_sentinel(text: &str) -> Option<&str> {
    let upper = text.to_ascii_uppercase();
    let bracket = upper.find("[ERROR]").map(|at| at + "[ERROR]".len());
    let cross = text.find('❌').map(|at| at + '❌'.len_utf8());
    let prefix = text.find("ERROR:").map(|at| at + "ERROR:".len());

    let after = [bracket, cross, prefix].into_iter().flatten().min()?;
    let detail = text[after..].trim_start_matches([':', '-', ' ']).trim();
    Some(if detail.is_empty() { GENERIC_FAILURE } else { detail })
}

fn strip_error_marker(text: &str) -> &str {
    error_sentinel(text).unwrap_or(text.trim())
}

fn completion_sentinel(text: &str) -> bool {
    let upper = text.to_ascii_uppercase();
    upper.contains("[DONE]") || upper.contains("[COMPLETE]")
}

fn is_one_of(value: &str, names: &[&str]) -> bool {
    names.iter().any(|name| value.trim().eq_ignore_ascii_case(name))
}

fn str_field<'a>(fields: &'a Map<String, Value>, names: &[&str]) -> Option<&'a str> {
    names
        .iter()
        .filter_map(|name| fields.get(*name))
        .find_map(Value::as_str)
}

fn u64_field(fields: &Map<String, Value>, names: &[&str]) -> Option<u64> {
    names.iter().filter_map(|name| fields.get(*name)).find_map(|value| {
        value
            .as_u64()
            .or_else(|| value.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
    })
}

fn bracket_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\[\s*stage\s*=\s*(?P<stage>[^\]\s]+)\s*\]\s*(?P<rest>.*)$")
            .expect("bracket pattern is valid")
    })
}

fn console_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?:[^A-Za-z0-9_\s\[]+\s*)?(?P<stage>[A-Za-z][A-Za-z0-9_-]*)\s*:\s*(?P<rest>.*)$")
            .expect("console pattern is valid")
    })
}

fn counter_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\(?\s*(?P<current>\d+)\s*/\s*(?P<total>\d+)\s*\)?$")
            .expect("counter pattern is valid")
    })
}

fn percent_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\(?\s*(?P<percent>\d+(?:\.\d+)?)\s*%\s*\)?$").expect("percent pattern is valid")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::Terminal;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn bracket_form_with_counters() {
        let update = normalize("[stage=extract] 1/4");
        assert_eq!(update.stage_key.as_str(), "extract");
        assert_eq!(update.label, "Extracting archive");
        assert!(approx(update.fraction_complete, 0.12 + 0.25 * 0.03));
        assert!(!update.is_terminal());
    }

    #[test]
    fn bracket_form_for_unknown_stage_uses_message_and_ratio() {
        let update = normalize("[stage=posters] Fetching posters 3/4");
        assert_eq!(update.stage_key.as_str(), "posters");
        assert_eq!(update.label, "Fetching posters");
        assert_eq!(update.icon, "");
        assert!(approx(update.fraction_complete, 0.75));
    }

    #[test]
    fn console_convention_is_parsed() {
        let update = normalize("📊 tmdb_matching: Matching films to TMDb... (50/200)");
        assert_eq!(update.stage_key.as_str(), "tmdb_matching");
        assert_eq!(update.label, "Matching films");
        assert_eq!(update.icon, "🔎");
        assert!(approx(update.fraction_complete, 0.20 + 0.25 * 0.25));
    }

    #[test]
    fn console_error_stage_is_failure() {
        let update = normalize("📊 error: Analysis failed: no diary.csv (0/1)");
        assert_eq!(update.error_detail(), Some("Analysis failed: no diary.csv"));
    }

    #[test]
    fn percent_suffix_is_used() {
        let update = normalize("[stage=tmdb_metadata] halfway 50%");
        assert!(approx(update.fraction_complete, 0.45 + 0.5 * 0.45));
    }

    #[test]
    fn structured_snapshot_maps_fields() {
        let update = normalize(
            r#"{"stage":"tmdb_metadata","message":"Gathering film metadata (fast)...","progress":30,"total":60}"#,
        );
        assert_eq!(update.stage_key.as_str(), "tmdb_metadata");
        assert_eq!(update.label, "Gathering film metadata");
        assert!(approx(update.fraction_complete, 0.45 + 0.5 * 0.45));
    }

    #[test]
    fn structured_error_passes_message_through() {
        let update = normalize(r#"{"stage":"error","message":"Analysis failed: bad zip","progress":0,"total":1}"#);
        assert_eq!(update.error_detail(), Some("Analysis failed: bad zip"));
    }

    #[test]
    fn structured_success_carries_result() {
        let update = normalize(r#"{"status":"success","stats":{"total_films":12}}"#);
        match update.terminal {
            Some(Terminal::Success { result: Some(result) }) => {
                assert_eq!(result["total_films"], 12);
            }
            other => panic!("unexpected terminal {other:?}"),
        }
        assert!(approx(update.fraction_complete, 1.0));
    }

    #[test]
    fn idle_snapshot_is_not_a_stage() {
        let update = normalize(r#"{"stage":"idle","message":"Ready to analyze","progress":0,"total":0}"#);
        assert!(update.stage_key.is_unknown());
        assert_eq!(update.label, "Ready to analyze");
    }

    #[test]
    fn error_sentinel_anywhere_in_text() {
        let update = normalize("[ERROR] invalid archive format");
        assert_eq!(update.error_detail(), Some("invalid archive format"));

        let update = normalize("worker said ❌ out of memory");
        assert_eq!(update.error_detail(), Some("out of memory"));

        let update = normalize("[ERROR]");
        assert_eq!(update.error_detail(), Some(GENERIC_FAILURE));
    }

    #[test]
    fn done_sentinel_is_success() {
        let update = normalize("[DONE]");
        assert!(matches!(update.terminal, Some(Terminal::Success { result: None })));
        assert!(approx(update.fraction_complete, 1.0));
    }

    #[test]
    fn malformed_text_falls_back_to_unknown() {
        let raw = "  ### garbled frame without any structure ###  ";
        let update = normalize(raw);
        assert!(update.stage_key.is_unknown());
        assert_eq!(update.label, raw);
        assert!(!update.is_terminal());
    }

    #[test]
    fn prose_with_colon_is_not_a_stage() {
        let update = normalize("Note: the server is warming up");
        assert!(update.stage_key.is_unknown());
        assert_eq!(update.label, "Note: the server is warming up");
    }

    #[test]
    fn broken_json_is_treated_as_text() {
        let update = normalize("{\"stage\": \"loading\"");
        assert!(update.stage_key.is_unknown());
    }
}
