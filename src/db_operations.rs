use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;

use crate::data_types::{Canteen, Diet, Dish, NamedServing, Notification, OpeningTimes, Serving};

pub fn check_or_create_db_tables(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "create table if not exists canteens (
            id integer primary key,
            name text not null unique,
            active integer not null default 1
        );

        create table if not exists dishes (
            id integer primary key,
            name text not null,
            vegetarian integer not null,
            vegan integer not null
        );

        create table if not exists opening_times (
            canteen_id integer not null references canteens(id),
            weekday integer not null check (weekday between 1 and 7),
            start_time text not null,
            end_time text not null,
            unique (canteen_id, weekday)
        );

        create table if not exists servings (
            id integer primary key,
            date text not null,
            canteen_id integer not null references canteens(id),
            dish_id integer not null references dishes(id),
            price text not null,
            price_staff text not null,
            allergens text not null default '',
            official integer not null,
            officially_deprecated integer not null default 0,
            last_updated integer not null,
            notified integer not null default 0
        );
        create index if not exists servings_by_day on servings (date, canteen_id);

        create table if not exists inofficial_deprecations (
            serving_id integer not null references servings(id),
            reporter_id integer not null,
            reported_at text not null,
            unique (serving_id, reporter_id)
        );

        create table if not exists serving_verifications (
            serving_id integer not null references servings(id),
            user_id integer not null,
            verified_at text not null,
            unique (serving_id, user_id)
        );

        create table if not exists ratings (
            user_id integer not null,
            serving_id integer not null references servings(id),
            rating integer not null check (rating between 1 and 5),
            unique (user_id, serving_id)
        );

        create table if not exists notifications (
            id integer primary key,
            user_id integer not null,
            email text not null,
            pattern text not null,
            active integer not null default 1,
            last_notified text
        );",
    )
}

// canteens

pub fn get_or_create_canteen(conn: &Connection, name: &str) -> rusqlite::Result<i64> {
    let existing = conn
        .prepare_cached("SELECT id FROM canteens WHERE name = ?1")?
        .query_row(params![name], |row| row.get(0))
        .optional()?;

    match existing {
        Some(id) => Ok(id),
        None => {
            conn.prepare_cached("INSERT INTO canteens (name) VALUES (?1)")?
                .execute(params![name])?;
            log::info!("New canteen '{}'", name);
            Ok(conn.last_insert_rowid())
        }
    }
}

fn row_to_canteen(row: &Row) -> rusqlite::Result<Canteen> {
    Ok(Canteen {
        id: row.get(0)?,
        name: row.get(1)?,
        active: row.get(2)?,
    })
}

pub fn get_canteen(conn: &Connection, id: i64) -> rusqlite::Result<Option<Canteen>> {
    conn.prepare_cached("SELECT id, name, active FROM canteens WHERE id = ?1")?
        .query_row(params![id], row_to_canteen)
        .optional()
}

pub fn get_canteen_by_name(conn: &Connection, name: &str) -> rusqlite::Result<Option<Canteen>> {
    conn.prepare_cached("SELECT id, name, active FROM canteens WHERE name = ?1")?
        .query_row(params![name], row_to_canteen)
        .optional()
}

pub fn set_canteen_active(conn: &Connection, name: &str, active: bool) -> rusqlite::Result<usize> {
    conn.prepare_cached("UPDATE canteens SET active = ?2 WHERE name = ?1")?
        .execute(params![name, active])
}

pub fn upsert_opening_time(
    conn: &Connection,
    canteen_id: i64,
    weekday: u32,
    start: NaiveTime,
    end: NaiveTime,
) -> rusqlite::Result<()> {
    conn.prepare_cached(
        "INSERT INTO opening_times (canteen_id, weekday, start_time, end_time)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (canteen_id, weekday)
            DO UPDATE SET start_time = excluded.start_time, end_time = excluded.end_time",
    )?
    .execute(params![canteen_id, weekday, start, end])?;

    Ok(())
}

pub fn get_opening_times(conn: &Connection, canteen_id: i64) -> rusqlite::Result<OpeningTimes> {
    let mut stmt = conn.prepare_cached(
        "SELECT weekday, start_time, end_time FROM opening_times
            WHERE canteen_id = ?1 ORDER BY weekday",
    )?;
    let rows = stmt.query_map(params![canteen_id], |row| {
        Ok((row.get::<_, u32>(0)?, (row.get(1)?, row.get(2)?)))
    })?;

    rows.collect()
}

// dishes

/// All dishes of one vegetarian/vegan class, oldest first.
pub fn dishes_in_class(conn: &Connection, diet: Diet) -> rusqlite::Result<Vec<Dish>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, name, vegetarian, vegan FROM dishes
            WHERE vegetarian = ?1 AND vegan = ?2 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![diet.vegetarian, diet.vegan], row_to_dish)?;

    rows.collect()
}

fn row_to_dish(row: &Row) -> rusqlite::Result<Dish> {
    Ok(Dish {
        id: row.get(0)?,
        name: row.get(1)?,
        vegetarian: row.get(2)?,
        vegan: row.get(3)?,
    })
}

pub fn insert_dish(conn: &Connection, name: &str, diet: Diet) -> rusqlite::Result<i64> {
    conn.prepare_cached("INSERT INTO dishes (name, vegetarian, vegan) VALUES (?1, ?2, ?3)")?
        .execute(params![name, diet.vegetarian, diet.vegan])?;

    Ok(conn.last_insert_rowid())
}

pub fn get_dish(conn: &Connection, id: i64) -> rusqlite::Result<Option<Dish>> {
    conn.prepare_cached("SELECT id, name, vegetarian, vegan FROM dishes WHERE id = ?1")?
        .query_row(params![id], row_to_dish)
        .optional()
}

/// Dishes ordered by how often they were served.
pub fn most_frequent_dishes(conn: &Connection, limit: usize) -> rusqlite::Result<Vec<(Dish, u32)>> {
    let mut stmt = conn.prepare_cached(
        "SELECT d.id, d.name, d.vegetarian, d.vegan, COUNT(s.id) AS n
            FROM dishes d LEFT JOIN servings s ON s.dish_id = d.id
            GROUP BY d.id ORDER BY n DESC, d.id LIMIT ?1",
    )?;
    let rows = stmt.query_map(params![limit as i64], |row| {
        Ok((row_to_dish(row)?, row.get(4)?))
    })?;

    rows.collect()
}

// servings

pub struct NewServing<'a> {
    pub day: NaiveDate,
    pub canteen_id: i64,
    pub dish_id: i64,
    pub price: Decimal,
    pub price_staff: Decimal,
    pub allergens: &'a BTreeSet<String>,
    pub official: bool,
    pub last_updated: DateTime<Utc>,
}

const SERVING_COLUMNS: &str = "s.id, s.date, s.canteen_id, s.dish_id, s.price, s.price_staff,
    s.allergens, s.official, s.officially_deprecated, s.last_updated, s.notified";

fn decimal_column(row: &Row, idx: usize) -> rusqlite::Result<Decimal> {
    let text: String = row.get(idx)?;
    Decimal::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn timestamp_column(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let micros: i64 = row.get(idx)?;
    DateTime::from_timestamp_micros(micros).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, micros))
}

fn join_allergens(allergens: &BTreeSet<String>) -> String {
    allergens.iter().map(String::as_str).collect::<Vec<_>>().join(" ")
}

fn row_to_serving(row: &Row) -> rusqlite::Result<Serving> {
    let allergens: String = row.get(6)?;
    Ok(Serving {
        id: row.get(0)?,
        day: row.get(1)?,
        canteen_id: row.get(2)?,
        dish_id: row.get(3)?,
        price: decimal_column(row, 4)?,
        price_staff: decimal_column(row, 5)?,
        allergens: allergens.split_whitespace().map(str::to_string).collect(),
        official: row.get(7)?,
        officially_deprecated: row.get(8)?,
        last_updated: timestamp_column(row, 9)?,
        notified: row.get(10)?,
    })
}

pub fn insert_serving(conn: &Connection, serving: &NewServing) -> rusqlite::Result<i64> {
    conn.prepare_cached(
        "INSERT INTO servings
            (date, canteen_id, dish_id, price, price_staff, allergens, official, last_updated)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )?
    .execute(params![
        serving.day,
        serving.canteen_id,
        serving.dish_id,
        serving.price.to_string(),
        serving.price_staff.to_string(),
        join_allergens(serving.allergens),
        serving.official,
        serving.last_updated.timestamp_micros(),
    ])?;

    Ok(conn.last_insert_rowid())
}

/// Ids of all servings of one dish at one canteen on one day.
pub fn find_servings(
    conn: &Connection,
    day: NaiveDate,
    canteen_id: i64,
    dish_id: i64,
) -> rusqlite::Result<Vec<i64>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id FROM servings
            WHERE date = ?1 AND canteen_id = ?2 AND dish_id = ?3 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![day, canteen_id, dish_id], |row| row.get(0))?;

    rows.collect()
}

/// Applies an official sighting to an existing serving.
pub fn touch_official_serving(
    conn: &Connection,
    id: i64,
    price: Decimal,
    price_staff: Decimal,
    allergens: &BTreeSet<String>,
    now: DateTime<Utc>,
) -> rusqlite::Result<()> {
    conn.prepare_cached(
        "UPDATE servings
            SET price = ?2, price_staff = ?3, allergens = ?4,
                official = 1, officially_deprecated = 0, last_updated = ?5
            WHERE id = ?1",
    )?
    .execute(params![
        id,
        price.to_string(),
        price_staff.to_string(),
        join_allergens(allergens),
        now.timestamp_micros()
    ])?;

    Ok(())
}

/// Official servings of the day that were not touched since `now`.
pub fn stale_official_servings(
    conn: &Connection,
    day: NaiveDate,
    canteen_id: i64,
    now: DateTime<Utc>,
) -> rusqlite::Result<Vec<i64>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id FROM servings
            WHERE date = ?1 AND canteen_id = ?2 AND official = 1
                AND officially_deprecated = 0 AND last_updated < ?3
            ORDER BY id",
    )?;
    let rows = stmt.query_map(params![day, canteen_id, now.timestamp_micros()], |row| {
        row.get(0)
    })?;

    rows.collect()
}

pub fn mark_officially_deprecated(conn: &Connection, id: i64) -> rusqlite::Result<()> {
    conn.prepare_cached("UPDATE servings SET officially_deprecated = 1 WHERE id = ?1")?
        .execute(params![id])?;

    Ok(())
}

pub fn get_serving(conn: &Connection, id: i64) -> rusqlite::Result<Option<Serving>> {
    conn.prepare_cached(&format!(
        "SELECT {} FROM servings s WHERE s.id = ?1",
        SERVING_COLUMNS
    ))?
    .query_row(params![id], row_to_serving)
    .optional()
}

/// Servings of a day joined with dish and canteen names.
pub fn servings_with_names(
    conn: &Connection,
    day: NaiveDate,
    only_unnotified: bool,
) -> rusqlite::Result<Vec<NamedServing>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {}, d.name, c.name FROM servings s
            JOIN dishes d ON d.id = s.dish_id
            JOIN canteens c ON c.id = s.canteen_id
            WHERE s.date = ?1 AND (?2 = 0 OR s.notified = 0)
            ORDER BY c.name, s.officially_deprecated, d.name, s.id",
        SERVING_COLUMNS
    ))?;
    let rows = stmt.query_map(params![day, only_unnotified], |row| {
        Ok(NamedServing {
            serving: row_to_serving(row)?,
            dish_name: row.get(11)?,
            canteen_name: row.get(12)?,
        })
    })?;

    rows.collect()
}

pub fn last_updated(conn: &Connection) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let micros: Option<i64> = conn
        .prepare_cached("SELECT MAX(last_updated) FROM servings")?
        .query_row([], |row| row.get(0))?;

    Ok(micros.and_then(DateTime::from_timestamp_micros))
}

pub fn mark_servings_notified(conn: &Connection, ids: &[i64]) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare_cached("UPDATE servings SET notified = 1 WHERE id = ?1")?;
    for id in ids {
        stmt.execute(params![id])?;
    }

    Ok(())
}

// crowd feedback

pub fn insert_deprecation_report(
    conn: &Connection,
    serving_id: i64,
    reporter_id: i64,
    now: DateTime<Utc>,
) -> rusqlite::Result<()> {
    conn.prepare_cached(
        "INSERT INTO inofficial_deprecations (serving_id, reporter_id, reported_at)
            VALUES (?1, ?2, ?3)",
    )?
    .execute(params![serving_id, reporter_id, now])?;

    Ok(())
}

pub fn insert_verification(
    conn: &Connection,
    serving_id: i64,
    user_id: i64,
    now: DateTime<Utc>,
) -> rusqlite::Result<()> {
    conn.prepare_cached(
        "INSERT INTO serving_verifications (serving_id, user_id, verified_at)
            VALUES (?1, ?2, ?3)",
    )?
    .execute(params![serving_id, user_id, now])?;

    Ok(())
}

pub fn insert_rating(
    conn: &Connection,
    user_id: i64,
    serving_id: i64,
    rating: u8,
) -> rusqlite::Result<()> {
    conn.prepare_cached("INSERT INTO ratings (user_id, serving_id, rating) VALUES (?1, ?2, ?3)")?
        .execute(params![user_id, serving_id, rating])?;

    Ok(())
}

pub fn has_rated(conn: &Connection, user_id: i64, serving_id: i64) -> rusqlite::Result<bool> {
    conn.prepare_cached("SELECT 1 FROM ratings WHERE user_id = ?1 AND serving_id = ?2")?
        .exists(params![user_id, serving_id])
}

/// Ratings a user gave to servings of the given day.
pub fn count_ratings_for_day(
    conn: &Connection,
    user_id: i64,
    day: NaiveDate,
) -> rusqlite::Result<u32> {
    conn.prepare_cached(
        "SELECT COUNT(*) FROM ratings r JOIN servings s ON s.id = r.serving_id
            WHERE r.user_id = ?1 AND s.date = ?2",
    )?
    .query_row(params![user_id, day], |row| row.get(0))
}

/// (verifications, deprecation reports, average rating, rating count) of one serving.
pub fn serving_counters(
    conn: &Connection,
    serving_id: i64,
) -> rusqlite::Result<(u32, u32, Option<f64>, u32)> {
    conn.prepare_cached(
        "SELECT
            (SELECT COUNT(*) FROM serving_verifications WHERE serving_id = ?1),
            (SELECT COUNT(*) FROM inofficial_deprecations WHERE serving_id = ?1),
            (SELECT AVG(rating) FROM ratings WHERE serving_id = ?1),
            (SELECT COUNT(*) FROM ratings WHERE serving_id = ?1)",
    )?
    .query_row(params![serving_id], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
    })
}

// notifications

pub fn insert_notification(
    conn: &Connection,
    user_id: i64,
    email: &str,
    pattern: &str,
) -> rusqlite::Result<i64> {
    conn.prepare_cached("INSERT INTO notifications (user_id, email, pattern) VALUES (?1, ?2, ?3)")?
        .execute(params![user_id, email, pattern])?;

    Ok(conn.last_insert_rowid())
}

pub fn set_notification_active(conn: &Connection, id: i64, active: bool) -> rusqlite::Result<usize> {
    conn.prepare_cached("UPDATE notifications SET active = ?2 WHERE id = ?1")?
        .execute(params![id, active])
}

fn row_to_notification(row: &Row) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: row.get(0)?,
        user_id: row.get(1)?,
        email: row.get(2)?,
        pattern: row.get(3)?,
        active: row.get(4)?,
        last_notified: row.get(5)?,
    })
}

pub fn active_notifications(conn: &Connection) -> rusqlite::Result<Vec<Notification>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, user_id, email, pattern, active, last_notified FROM notifications
            WHERE active = 1 ORDER BY id",
    )?;
    let rows = stmt.query_map([], row_to_notification)?;

    rows.collect()
}

pub fn get_notification(conn: &Connection, id: i64) -> rusqlite::Result<Option<Notification>> {
    conn.prepare_cached(
        "SELECT id, user_id, email, pattern, active, last_notified FROM notifications
            WHERE id = ?1",
    )?
    .query_row(params![id], row_to_notification)
    .optional()
}

pub fn set_last_notified(conn: &Connection, ids: &[i64], now: DateTime<Utc>) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare_cached("UPDATE notifications SET last_notified = ?2 WHERE id = ?1")?;
    for id in ids {
        stmt.execute(params![id, now])?;
    }

    Ok(())
}
