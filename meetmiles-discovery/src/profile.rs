//! Candidate profiles and the parsing boundary for `profiles` rows.
//!
//! Backend rows are loosely shaped (photos in particular arrive as arrays,
//! JSON text, Postgres array literals or a bare URL). Everything here is total:
//! a row either becomes a fully-typed [`CandidateProfile`] or is rejected for
//! lacking an id, and no other field can make parsing fail.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use meetmiles_shared::errors::{AppError, AppResult, ErrorCode};
use meetmiles_shared::types::query::{row_str, Row};

pub const PLACEHOLDER_PHOTO_URL: &str = "https://placehold.co/600x800?text=No+Photo";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Female,
    Male,
    Other,
}

impl Gender {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("female") | Some("woman") => Self::Female,
            Some("male") | Some("man") => Self::Male,
            _ => Self::Other,
        }
    }

    pub fn pronouns(&self) -> &'static str {
        match self {
            Self::Female => "she/her",
            Self::Male => "he/him",
            Self::Other => "they/them",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentTrip {
    pub place: String,
    pub vibe: Option<String>,
}

/// Read-only projection of another user, shown on one deck card.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateProfile {
    pub id: String,
    pub name: String,
    pub pronouns: String,
    pub badges: Vec<String>,
    /// Never empty; see [`normalize_photos`].
    pub photos: Vec<String>,
    pub prompts: Vec<Prompt>,
    pub bio: String,
    pub recent_trip: Option<RecentTrip>,
}

impl CandidateProfile {
    pub fn from_row(row: &Row) -> AppResult<Self> {
        Self::from_row_with(row, PLACEHOLDER_PHOTO_URL)
    }

    pub fn from_row_with(row: &Row, placeholder: &str) -> AppResult<Self> {
        let id = row_str(row, "id").ok_or_else(|| {
            AppError::with_details(
                ErrorCode::MalformedProfile,
                "profile row has no id",
                row.clone(),
            )
        })?;

        let name = row_str(row, "name")
            .or_else(|| row_str(row, "first_name"))
            .unwrap_or_default();

        Ok(Self {
            id: id.to_string(),
            name: name.trim().to_string(),
            pronouns: Gender::parse(row_str(row, "gender")).pronouns().to_string(),
            badges: parse_badges(row.get("badges").or_else(|| row.get("style_tags"))),
            photos: normalize_photos_with(row.get("photos"), placeholder),
            prompts: parse_prompts(row.get("prompts")),
            bio: row_str(row, "bio").unwrap_or_default().trim().to_string(),
            recent_trip: parse_recent_trip(row.get("recent_trip")),
        })
    }

    pub fn photo_count(&self) -> usize {
        self.photos.len()
    }
}

// --- Photos ---

pub fn normalize_photos(raw: Option<&Value>) -> Vec<String> {
    normalize_photos_with(raw, PLACEHOLDER_PHOTO_URL)
}

/// Clean a raw `photos` field into a non-empty list of http(s) URLs.
///
/// Accepts an array, JSON array text, a Postgres `{...}` literal, or a bare
/// URL. Anything unusable yields `[placeholder]`.
pub fn normalize_photos_with(raw: Option<&Value>, placeholder: &str) -> Vec<String> {
    let photos = match raw {
        Some(Value::Array(items)) => http_urls(items),
        Some(Value::String(text)) => photos_from_text(text),
        _ => Vec::new(),
    };

    if photos.is_empty() {
        vec![placeholder.to_string()]
    } else {
        photos
    }
}

fn is_http(s: &str) -> bool {
    s.starts_with("http")
}

fn http_urls(items: &[Value]) -> Vec<String> {
    items
        .iter()
        .filter_map(Value::as_str)
        .filter(|s| !s.is_empty() && is_http(s))
        .map(str::to_string)
        .collect()
}

fn photos_from_text(text: &str) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let brace_inner = trimmed
        .strip_prefix('{')
        .and_then(|rest| rest.strip_suffix('}'));
    let candidate = match brace_inner {
        Some(inner) => format!("[{inner}]"),
        None => trimmed.to_string(),
    };

    match serde_json::from_str::<Value>(&candidate) {
        Ok(Value::Array(items)) => http_urls(&items),
        Ok(Value::String(url)) if is_http(&url) => vec![url],
        Ok(_) => Vec::new(),
        // unquoted Postgres literal: {https://a.jpg,https://b.jpg}
        Err(_) if brace_inner.is_some() => brace_inner
            .unwrap_or_default()
            .split(',')
            .map(|part| part.trim().trim_matches('"').trim())
            .filter(|s| is_http(s))
            .map(str::to_string)
            .collect(),
        Err(_) if is_http(trimmed) => vec![trimmed.to_string()],
        Err(_) => Vec::new(),
    }
}

// --- Prompts, badges, trips ---

/// Decode a column that may hold the value itself or its JSON text.
fn decoded(raw: Option<&Value>) -> Option<Value> {
    match raw? {
        Value::String(text) => serde_json::from_str(text.trim()).ok(),
        Value::Null => None,
        other => Some(other.clone()),
    }
}

fn parse_prompts(raw: Option<&Value>) -> Vec<Prompt> {
    let Some(Value::Array(items)) = decoded(raw) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let question = row_str(item, "question")?.trim();
            let answer = row_str(item, "answer")?.trim();
            if question.is_empty() || answer.is_empty() {
                return None;
            }
            Some(Prompt {
                question: question.to_string(),
                answer: answer.to_string(),
            })
        })
        .collect()
}

fn parse_badges(raw: Option<&Value>) -> Vec<String> {
    match decoded(raw) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn parse_recent_trip(raw: Option<&Value>) -> Option<RecentTrip> {
    let trip = decoded(raw)?;
    let place = row_str(&trip, "place")?.trim();
    if place.is_empty() {
        return None;
    }
    Some(RecentTrip {
        place: place.to_string(),
        vibe: row_str(&trip, "vibe").map(|v| v.trim().to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn assert_well_formed(photos: &[String]) {
        assert!(!photos.is_empty());
        assert!(photos.iter().all(|p| p.starts_with("http")));
    }

    #[test]
    fn absent_or_empty_photos_fall_back_to_placeholder() {
        for raw in [None, Some(json!(null)), Some(json!([])), Some(json!("")), Some(json!("   "))] {
            assert_eq!(normalize_photos(raw.as_ref()), vec![PLACEHOLDER_PHOTO_URL]);
        }
    }

    #[test]
    fn array_keeps_only_http_strings() {
        let raw = json!(["https://a.jpg", "", "ftp://b.jpg", 42, null, "http://c.jpg"]);
        assert_eq!(normalize_photos(Some(&raw)), vec!["https://a.jpg", "http://c.jpg"]);

        let junk = json!(["nope", 1]);
        assert_eq!(normalize_photos(Some(&junk)), vec![PLACEHOLDER_PHOTO_URL]);
    }

    #[test]
    fn json_array_text_is_parsed() {
        let raw = json!(r#" ["https://a.jpg", "bad", "https://b.jpg"] "#);
        assert_eq!(normalize_photos(Some(&raw)), vec!["https://a.jpg", "https://b.jpg"]);
    }

    #[test]
    fn postgres_literals_are_parsed() {
        let quoted = json!(r#"{"https://a.jpg","https://b.jpg"}"#);
        assert_eq!(normalize_photos(Some(&quoted)), vec!["https://a.jpg", "https://b.jpg"]);

        let bare = json!("{https://a.jpg, https://b.jpg}");
        assert_eq!(normalize_photos(Some(&bare)), vec!["https://a.jpg", "https://b.jpg"]);

        let empty = json!("{}");
        assert_eq!(normalize_photos(Some(&empty)), vec![PLACEHOLDER_PHOTO_URL]);
    }

    #[test]
    fn bare_url_and_json_string() {
        let bare = json!("  https://cdn.example.com/p.jpg ");
        assert_eq!(normalize_photos(Some(&bare)), vec!["https://cdn.example.com/p.jpg"]);

        let quoted = json!(r#""https://cdn.example.com/q.jpg""#);
        assert_eq!(normalize_photos(Some(&quoted)), vec!["https://cdn.example.com/q.jpg"]);
    }

    #[test]
    fn garbage_never_fails() {
        let inputs = [
            json!("not a url"),
            json!("{{{"),
            json!("[1, 2"),
            json!(r#"{"a": 1}"#),
            json!(true),
            json!(3.5),
            json!({ "url": "https://a.jpg" }),
        ];
        for raw in inputs {
            let photos = normalize_photos(Some(&raw));
            assert_well_formed(&photos);
            assert_eq!(photos, vec![PLACEHOLDER_PHOTO_URL], "input: {raw}");
        }
    }

    #[test]
    fn custom_placeholder() {
        assert_eq!(normalize_photos_with(None, "https://x/none.png"), vec!["https://x/none.png"]);
    }

    #[test]
    fn pronouns_from_gender() {
        assert_eq!(Gender::parse(Some("female")).pronouns(), "she/her");
        assert_eq!(Gender::parse(Some(" Male ")).pronouns(), "he/him");
        assert_eq!(Gender::parse(Some("non_binary")).pronouns(), "they/them");
        assert_eq!(Gender::parse(None).pronouns(), "they/them");
    }

    #[test]
    fn profile_from_loose_row() {
        let row = json!({
            "id": "u2",
            "first_name": " Sam ",
            "gender": "female",
            "badges": r#"["hiker", " ", "foodie"]"#,
            "photos": "{https://a.jpg}",
            "prompts": [
                { "question": "Dream trip?", "answer": "Patagonia" },
                { "question": "Missing answer" },
                { "question": "", "answer": "blank question" }
            ],
            "bio": null,
            "recent_trip": { "place": "Lisbon", "vibe": "sunny" }
        });
        let profile = CandidateProfile::from_row(&row).unwrap();
        assert_eq!(profile.id, "u2");
        assert_eq!(profile.name, "Sam");
        assert_eq!(profile.pronouns, "she/her");
        assert_eq!(profile.badges, vec!["hiker", "foodie"]);
        assert_eq!(profile.photos, vec!["https://a.jpg"]);
        assert_eq!(profile.prompts.len(), 1);
        assert_eq!(profile.bio, "");
        assert_eq!(profile.recent_trip.unwrap().place, "Lisbon");
    }

    #[test]
    fn row_without_id_is_rejected() {
        let err = CandidateProfile::from_row(&json!({ "name": "Ghost" })).unwrap_err();
        assert_eq!(err.code(), ErrorCode::MalformedProfile);
    }
}
