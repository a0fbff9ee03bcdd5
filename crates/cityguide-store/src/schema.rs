//! Database schema SQL, additive column migrations and seed rows.

/// Base tables. Later columns are added by [`COLUMN_MIGRATIONS`] so that
/// databases created by older builds converge on the same shape.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS places (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    category TEXT,
    description TEXT,
    short_desc TEXT,
    lat REAL,
    lon REAL,
    address TEXT,
    phone TEXT,
    website TEXT,
    price TEXT,
    hours TEXT,
    rating REAL,
    image_urls TEXT
);

CREATE TABLE IF NOT EXISTS favorites (
    user_id INTEGER,
    place_id INTEGER,
    FOREIGN KEY(place_id) REFERENCES places(id)
);

CREATE TABLE IF NOT EXISTS tours (
    id INTEGER PRIMARY KEY,
    title TEXT NOT NULL,
    description TEXT,
    theme TEXT,
    duration INTEGER,
    distance REAL,
    cover_image TEXT,
    audio_intro TEXT,
    is_linear INTEGER,
    rating REAL,
    price REAL,
    author_id INTEGER
);

CREATE TABLE IF NOT EXISTS tour_points (
    tour_id INTEGER,
    place_id INTEGER,
    order_index INTEGER,
    audio_story TEXT,
    quiz_question TEXT,
    FOREIGN KEY(tour_id) REFERENCES tours(id),
    FOREIGN KEY(place_id) REFERENCES places(id)
);

CREATE TABLE IF NOT EXISTS user_tours (
    user_id INTEGER,
    tour_id INTEGER,
    progress INTEGER,
    current_point INTEGER,
    started_at TEXT,
    completed_at TEXT,
    rating_user INTEGER,
    PRIMARY KEY(user_id, tour_id),
    FOREIGN KEY(tour_id) REFERENCES tours(id)
);

CREATE TABLE IF NOT EXISTS reviews (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    place_id INTEGER NOT NULL,
    user_id INTEGER,
    rating INTEGER,
    comment TEXT,
    created_at TEXT,
    FOREIGN KEY(place_id) REFERENCES places(id)
);

CREATE TABLE IF NOT EXISTS cities (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    country TEXT,
    center_lat REAL,
    center_lon REAL,
    is_downloaded INTEGER DEFAULT 0,
    download_size INTEGER,
    last_update TEXT,
    is_active INTEGER DEFAULT 0
);

CREATE TABLE IF NOT EXISTS user_cities (
    user_id INTEGER,
    city_id INTEGER,
    downloaded_at TEXT,
    is_current INTEGER,
    points_visited INTEGER DEFAULT 0,
    tours_completed INTEGER DEFAULT 0
);

CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT UNIQUE NOT NULL,
    password_hash TEXT NOT NULL,
    role TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS support_messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    is_admin_sender INTEGER NOT NULL,
    message TEXT NOT NULL,
    created_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_tour_points_tour ON tour_points(tour_id, order_index);
CREATE INDEX IF NOT EXISTS idx_favorites_user ON favorites(user_id, place_id);
CREATE INDEX IF NOT EXISTS idx_reviews_place ON reviews(place_id);
CREATE INDEX IF NOT EXISTS idx_support_user ON support_messages(user_id);
"#;

/// Additive migrations: `(table, column, declared type)`.
///
/// Applied in order on every open; a column that already exists is skipped.
pub const COLUMN_MIGRATIONS: &[(&str, &str, &str)] = &[
    ("users", "first_name", "TEXT"),
    ("users", "last_name", "TEXT"),
    ("users", "email", "TEXT"),
    ("users", "secret_word", "TEXT"),
    ("tour_points", "image_urls", "TEXT"),
    ("places", "city_id", "INTEGER"),
    ("tours", "city_id", "INTEGER"),
    ("places", "name_ru", "TEXT"),
    ("places", "name_en", "TEXT"),
    ("places", "description_ru", "TEXT"),
    ("places", "description_en", "TEXT"),
    ("places", "short_desc_ru", "TEXT"),
    ("places", "short_desc_en", "TEXT"),
];

/// Backfills run after the column migrations. All are idempotent.
pub const BACKFILL_SQL: &str = r#"
UPDATE places SET city_id = 1 WHERE city_id IS NULL;
UPDATE tours SET city_id = 1 WHERE city_id IS NULL;
UPDATE places SET
    name_ru = COALESCE(name_ru, name),
    description_ru = COALESCE(description_ru, description),
    short_desc_ru = COALESCE(short_desc_ru, short_desc);
"#;

/// Built-in administrator created when the users table is empty.
pub const DEFAULT_ADMIN_USERNAME: &str = "admin";
pub const DEFAULT_ADMIN_PASSWORD: &str = "1234";
pub const DEFAULT_ADMIN_FIRST_NAME: &str = "Админ";

/// Default country for new cities.
pub const DEFAULT_COUNTRY: &str = "Россия";

/// Seed city row.
pub struct CitySeed {
    pub id: i64,
    pub name: &'static str,
    pub country: &'static str,
    pub center_lat: f64,
    pub center_lon: f64,
    pub is_downloaded: bool,
    pub download_size: i64,
    pub is_active: bool,
}

/// Cities inserted when the cities table is empty. Exactly one is active.
pub const DEFAULT_CITIES: &[CitySeed] = &[
    CitySeed {
        id: 1,
        name: "Москва",
        country: "Россия",
        center_lat: 55.751244,
        center_lon: 37.618423,
        is_downloaded: true,
        download_size: 0,
        is_active: true,
    },
    CitySeed {
        id: 2,
        name: "Санкт-Петербург",
        country: "Россия",
        center_lat: 59.9342802,
        center_lon: 30.3350986,
        is_downloaded: false,
        download_size: 245,
        is_active: false,
    },
    CitySeed {
        id: 3,
        name: "Казань",
        country: "Россия",
        center_lat: 55.796127,
        center_lon: 49.106405,
        is_downloaded: false,
        download_size: 320,
        is_active: false,
    },
    CitySeed {
        id: 4,
        name: "Екатеринбург",
        country: "Россия",
        center_lat: 56.838926,
        center_lon: 60.605703,
        is_downloaded: false,
        download_size: 280,
        is_active: false,
    },
    CitySeed {
        id: 5,
        name: "Сочи",
        country: "Россия",
        center_lat: 43.585525,
        center_lon: 39.723062,
        is_downloaded: false,
        download_size: 260,
        is_active: false,
    },
    CitySeed {
        id: 6,
        name: "Калининград",
        country: "Россия",
        center_lat: 54.710426,
        center_lon: 20.452214,
        is_downloaded: false,
        download_size: 230,
        is_active: false,
    },
];

/// Tables every valid database must contain.
pub const REQUIRED_TABLES: &[&str] = &[
    "places",
    "favorites",
    "tours",
    "tour_points",
    "user_tours",
    "reviews",
    "cities",
    "user_cities",
    "users",
    "support_messages",
];
