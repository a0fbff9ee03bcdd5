//! Row and input types for the CityGuide store.

use serde::{Deserialize, Deserializer, Serialize};

/// Accepts `true`/`false` as well as the `1`/`0` integers older fixtures use.
fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }
    Ok(Option::<Flag>::deserialize(deserializer)?.map(|f| match f {
        Flag::Bool(b) => b,
        Flag::Int(i) => i != 0,
    }))
}

/// Free-text field that some fixtures write as a bare number (`"price": 500`).
fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Text {
        Str(String),
        Int(i64),
        Float(f64),
        Bool(bool),
    }
    Ok(Option::<Text>::deserialize(deserializer)?.map(|t| match t {
        Text::Str(s) => s,
        Text::Int(i) => i.to_string(),
        Text::Float(f) => f.to_string(),
        Text::Bool(b) => b.to_string(),
    }))
}

/// `null` reads as an empty list.
fn url_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// A point of interest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub id: i64,
    pub name: String,
    pub name_ru: Option<String>,
    pub name_en: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub description_ru: Option<String>,
    pub description_en: Option<String>,
    pub short_desc: Option<String>,
    pub short_desc_ru: Option<String>,
    pub short_desc_en: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub price: Option<String>,
    pub hours: Option<String>,
    pub rating: Option<f64>,
    pub image_urls: Vec<String>,
    pub city_id: i64,
}

impl Place {
    /// Name in the requested language, falling back to Russian, then the base name.
    pub fn localized_name(&self, lang: &str) -> &str {
        let localized = match lang {
            "en" => self.name_en.as_deref(),
            _ => self.name_ru.as_deref(),
        };
        localized
            .filter(|s| !s.is_empty())
            .or(self.name_ru.as_deref().filter(|s| !s.is_empty()))
            .unwrap_or(&self.name)
    }
}

/// Place as it appears in fixture files and admin inserts.
///
/// Missing fields default; localized fallbacks are resolved on insert.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaceRecord {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub name_ru: Option<String>,
    pub name_en: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub description_ru: Option<String>,
    pub description_en: Option<String>,
    pub short_desc: Option<String>,
    pub short_desc_ru: Option<String>,
    pub short_desc_en: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    #[serde(deserialize_with = "text")]
    pub address: Option<String>,
    #[serde(deserialize_with = "text")]
    pub phone: Option<String>,
    #[serde(deserialize_with = "text")]
    pub website: Option<String>,
    #[serde(deserialize_with = "text")]
    pub price: Option<String>,
    #[serde(deserialize_with = "text")]
    pub hours: Option<String>,
    pub rating: Option<f64>,
    #[serde(deserialize_with = "url_list")]
    pub image_urls: Vec<String>,
    pub city_id: Option<i64>,
}

/// A curated tour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tour {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub theme: Option<String>,
    pub duration: Option<i64>,
    pub distance: Option<f64>,
    pub cover_image: Option<String>,
    pub audio_intro: Option<String>,
    pub is_linear: bool,
    pub rating: Option<f64>,
    pub price: Option<f64>,
    pub author_id: Option<i64>,
    pub city_id: i64,
}

/// A tour joined with one user's progress on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TourWithProgress {
    pub tour: Tour,
    pub progress: Option<i64>,
    pub current_point: Option<i64>,
    pub completed_at: Option<String>,
}

/// Tour as it appears in fixture files.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TourRecord {
    pub id: Option<i64>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub theme: Option<String>,
    pub duration: Option<i64>,
    pub distance: Option<f64>,
    pub cover_image: Option<String>,
    pub audio_intro: Option<String>,
    #[serde(deserialize_with = "flag")]
    pub is_linear: Option<bool>,
    pub rating: Option<f64>,
    pub price: Option<f64>,
    pub author_id: Option<i64>,
    pub city_id: Option<i64>,
    pub points: Vec<TourPointRecord>,
}

/// Basic tour fields edited by administrators.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TourUpdate {
    pub title: String,
    pub description: Option<String>,
    pub theme: Option<String>,
    pub price: Option<f64>,
    pub duration: Option<i64>,
    pub distance: Option<f64>,
    pub rating: Option<f64>,
    pub cover_image: Option<String>,
}

/// One stop of a tour. `place_id` is `None` for a custom narrative-only stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TourPoint {
    pub tour_id: i64,
    pub place_id: Option<i64>,
    pub order_index: i64,
    pub audio_story: String,
    pub quiz_question: String,
    pub image_urls: Vec<String>,
}

/// Input for a tour stop. `order_index` only orders the input; stored
/// indices are always renumbered 1..N.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TourPointRecord {
    pub place_id: Option<i64>,
    pub order_index: Option<i64>,
    pub audio_story: Option<String>,
    pub quiz_question: Option<String>,
    #[serde(deserialize_with = "url_list")]
    pub image_urls: Vec<String>,
}

/// A user's review of a place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: i64,
    pub place_id: i64,
    pub user_id: Option<i64>,
    pub rating: i64,
    pub comment: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct City {
    pub id: i64,
    pub name: String,
    pub country: Option<String>,
    pub center_lat: Option<f64>,
    pub center_lon: Option<f64>,
    pub is_downloaded: bool,
    pub download_size: Option<i64>,
    pub last_update: Option<String>,
    pub is_active: bool,
}

/// Input for [`crate::SqliteStore::add_city`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCity {
    pub name: String,
    pub country: String,
    pub center_lat: f64,
    pub center_lon: f64,
    pub is_downloaded: bool,
    pub download_size: i64,
    pub is_active: bool,
}

impl Default for NewCity {
    fn default() -> Self {
        Self {
            name: String::new(),
            country: crate::schema::DEFAULT_COUNTRY.to_string(),
            center_lat: 0.0,
            center_lon: 0.0,
            is_downloaded: false,
            download_size: 0,
            is_active: false,
        }
    }
}

/// Per-user bookkeeping for a city.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserCity {
    pub user_id: i64,
    pub city_id: i64,
    pub downloaded_at: Option<String>,
    pub is_current: bool,
    pub points_visited: i64,
    pub tours_completed: i64,
}

/// Stored progress of one user through one tour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserTourProgress {
    pub user_id: i64,
    pub tour_id: i64,
    pub progress: i64,
    pub current_point: i64,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub rating_user: Option<i64>,
}

/// Upsert input. `started_at` and `rating_user` keep their stored values
/// when `None`; the other fields are overwritten.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub user_id: i64,
    pub tour_id: i64,
    pub progress: i64,
    pub current_point: i64,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub rating_user: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
        }
    }

    /// Parse a stored role; anything unknown is a plain user.
    pub fn parse(s: &str) -> Self {
        match s {
            "admin" => Self::Admin,
            _ => Self::User,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full user row, including the password hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub secret_word: String,
}

/// User listing without credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
    pub role: Role,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    /// Unrecognized or missing roles become [`Role::User`].
    pub role: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub secret_word: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportMessage {
    pub id: i64,
    pub user_id: i64,
    pub is_admin_sender: bool,
    pub message: String,
    pub created_at: String,
}

/// A user with a support conversation and its latest message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportThread {
    pub user_id: i64,
    pub username: String,
    pub last_message: Option<String>,
}

/// Row counts per table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub cities: i64,
    pub places: i64,
    pub tours: i64,
    pub tour_points: i64,
    pub reviews: i64,
    pub favorites: i64,
    pub users: i64,
    pub support_messages: i64,
    pub db_path: String,
}
