//! Read-only health check of a CityGuide data directory.
//!
//! Verifies that the database has every table and migrated column, gathers
//! row counts and flags integrity problems the store normally prevents.

use std::path::Path;

use cityguide_store::password::is_legacy_hash;
use cityguide_store::schema::{COLUMN_MIGRATIONS, REQUIRED_TABLES};
use rusqlite::Connection;
use tracing::info;

/// Result of a validation run.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub db_valid: bool,
    pub places: i64,
    pub tours: i64,
    pub tour_points: i64,
    pub users: i64,
    pub cities: i64,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

/// Validate the database under `data_dir`.
pub fn validate(data_dir: &Path) -> ValidationReport {
    let mut report = ValidationReport::default();

    let db_path = data_dir.join("cityguide.db");
    if !db_path.exists() {
        report
            .errors
            .push(format!("Database not found: {}", db_path.display()));
        return report;
    }

    let conn = match Connection::open_with_flags(&db_path, rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY) {
        Ok(c) => c,
        Err(e) => {
            report.errors.push(format!("Failed to open database: {}", e));
            return report;
        }
    };

    for table in REQUIRED_TABLES {
        match table_exists(&conn, table) {
            Ok(true) => {}
            Ok(false) => report.errors.push(format!("Missing required table: {}", table)),
            Err(e) => report
                .errors
                .push(format!("Error checking table {}: {}", table, e)),
        }
    }
    if !report.errors.is_empty() {
        return report;
    }

    for (table, column, _) in COLUMN_MIGRATIONS {
        if !get_column_names(&conn, table).iter().any(|c| c == column) {
            report
                .errors
                .push(format!("{} table missing column: {}", table, column));
        }
    }
    if !report.errors.is_empty() {
        return report;
    }

    report.db_valid = true;
    report.places = count_rows(&conn, "places").unwrap_or(0);
    report.tours = count_rows(&conn, "tours").unwrap_or(0);
    report.tour_points = count_rows(&conn, "tour_points").unwrap_or(0);
    report.users = count_rows(&conn, "users").unwrap_or(0);
    report.cities = count_rows(&conn, "cities").unwrap_or(0);

    let active = scalar(&conn, "SELECT COUNT(*) FROM cities WHERE is_active = 1");
    if active != 1 {
        report
            .warnings
            .push(format!("{} active cities (expected exactly 1)", active));
    }

    let dangling = scalar(
        &conn,
        "SELECT COUNT(*) FROM tour_points \
         WHERE place_id IS NOT NULL AND place_id NOT IN (SELECT id FROM places)",
    );
    if dangling > 0 {
        report
            .warnings
            .push(format!("{} tour stops reference missing places", dangling));
    }

    // stops of a tour must be numbered 1..N
    let misnumbered = scalar(
        &conn,
        "SELECT COUNT(*) FROM (SELECT tour_id FROM tour_points GROUP BY tour_id \
         HAVING MIN(order_index) != 1 OR MAX(order_index) != COUNT(*) \
         OR COUNT(DISTINCT order_index) != COUNT(*))",
    );
    if misnumbered > 0 {
        report
            .warnings
            .push(format!("{} tours have non-contiguous stop numbering", misnumbered));
    }

    let legacy = legacy_hash_count(&conn);
    if legacy > 0 {
        report.warnings.push(format!(
            "{} users still have unsalted password hashes (upgraded on next login)",
            legacy
        ));
    }

    if !data_dir.join("settings.json").exists() {
        report.warnings.push("No settings.json found".to_string());
    }

    info!(
        "Validated {}: {} places, {} tours, {} users",
        db_path.display(),
        report.places,
        report.tours,
        report.users
    );
    report
}

/// Print a validation report to stdout.
pub fn print_report(report: &ValidationReport) {
    println!("=== CityGuide Database Report ===");
    println!();
    println!("Database valid:     {}", if report.db_valid { "YES" } else { "NO" });
    println!("Cities:             {}", report.cities);
    println!("Places:             {}", report.places);
    println!("Tours:              {}", report.tours);
    println!("Tour stops:         {}", report.tour_points);
    println!("Users:              {}", report.users);

    if !report.warnings.is_empty() {
        println!();
        println!("Warnings:");
        for w in &report.warnings {
            println!("  - {}", w);
        }
    }

    if !report.errors.is_empty() {
        println!();
        println!("Errors:");
        for e in &report.errors {
            println!("  - {}", e);
        }
    }

    println!();
    if report.errors.is_empty() && report.db_valid {
        println!("Status: OK");
    } else {
        println!("Status: INVALID");
    }
}

// Internal helpers

fn table_exists(conn: &Connection, table: &str) -> Result<bool, rusqlite::Error> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn get_column_names(conn: &Connection, table: &str) -> Vec<String> {
    // table names come from the schema constants, never from input
    let query = format!("PRAGMA table_info({})", table);
    let mut names = Vec::new();
    if let Ok(mut stmt) = conn.prepare(&query) {
        if let Ok(rows) = stmt.query_map([], |row| row.get::<_, String>(1)) {
            names.extend(rows.flatten());
        }
    }
    names
}

fn count_rows(conn: &Connection, table: &str) -> Result<i64, rusqlite::Error> {
    let query = format!("SELECT COUNT(*) FROM {}", table);
    conn.query_row(&query, [], |row| row.get(0))
}

fn scalar(conn: &Connection, sql: &str) -> i64 {
    conn.query_row(sql, [], |row| row.get(0)).unwrap_or(0)
}

fn legacy_hash_count(conn: &Connection) -> usize {
    let Ok(mut stmt) = conn.prepare("SELECT password_hash FROM users") else {
        return 0;
    };
    let Ok(rows) = stmt.query_map([], |row| row.get::<_, String>(0)) else {
        return 0;
    };
    rows.flatten().filter(|h| is_legacy_hash(h)).count()
}
