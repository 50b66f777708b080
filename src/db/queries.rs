use chrono::{Datelike, NaiveDateTime};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};

use crate::errors::{AppError, Result};
use crate::models::{Booking, BookingStatus, ListScope, NewBooking, Role, Service, User};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const BOOKING_COLUMNS: &str =
    "id, customer_id, service_id, staff_id, start_time, end_time, status, notes, created_at";

fn fmt_ts(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Timestamps are compared as text, which only orders correctly for
/// four-digit years.
pub fn is_storable(ts: &NaiveDateTime) -> bool {
    (0..=9999).contains(&ts.year())
}

// ── Bookings ──

/// Inserts a new `booked` row and returns it with its assigned id.
pub fn create_booking(conn: &Connection, new: &NewBooking) -> Result<Booking> {
    for ts in [&new.start_time, &new.end_time] {
        if !is_storable(ts) {
            return Err(AppError::BadRequest(format!("time {ts} is out of range")));
        }
    }

    let booking = Booking {
        id: uuid::Uuid::new_v4().to_string(),
        customer_id: new.customer_id,
        service_id: new.service_id,
        staff_id: new.staff_id,
        start_time: new.start_time,
        end_time: new.end_time,
        status: BookingStatus::Booked,
        notes: new.notes.clone(),
        created_at: new.created_at,
    };

    let inserted = conn.execute(
        "INSERT INTO bookings (id, customer_id, service_id, staff_id, start_time, end_time, status, notes, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            booking.id,
            booking.customer_id,
            booking.service_id,
            booking.staff_id,
            fmt_ts(&booking.start_time),
            fmt_ts(&booking.end_time),
            booking.status.as_str(),
            booking.notes,
            fmt_ts(&booking.created_at),
        ],
    );

    match inserted {
        Ok(_) => Ok(booking),
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Err(AppError::Conflict(format!("booking {} already exists", booking.id)))
        }
        Err(e) => Err(e.into()),
    }
}

pub fn get_booking(conn: &Connection, id: &str) -> Result<Option<Booking>> {
    let booking = conn
        .query_row(
            &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1"),
            params![id],
            parse_booking_row,
        )
        .optional()?;
    Ok(booking)
}

pub fn list_all_bookings(conn: &Connection) -> Result<Vec<Booking>> {
    query_bookings(
        conn,
        &format!("SELECT {BOOKING_COLUMNS} FROM bookings ORDER BY start_time DESC"),
        params![],
    )
}

pub fn list_bookings_by_customer(conn: &Connection, customer_id: i64) -> Result<Vec<Booking>> {
    query_bookings(
        conn,
        &format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE customer_id = ?1 ORDER BY start_time DESC"
        ),
        params![customer_id],
    )
}

pub fn list_bookings_by_staff(conn: &Connection, staff_id: i64) -> Result<Vec<Booking>> {
    query_bookings(
        conn,
        &format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE staff_id = ?1 ORDER BY start_time DESC"
        ),
        params![staff_id],
    )
}

pub fn list_bookings(conn: &Connection, scope: ListScope) -> Result<Vec<Booking>> {
    match scope {
        ListScope::All => list_all_bookings(conn),
        ListScope::AssignedTo(staff_id) => list_bookings_by_staff(conn, staff_id),
        ListScope::OwnedBy(customer_id) => list_bookings_by_customer(conn, customer_id),
    }
}

/// Bookings starting at or after `now`, soonest first. Status is not filtered.
pub fn list_upcoming_bookings(conn: &Connection, now: &NaiveDateTime) -> Result<Vec<Booking>> {
    query_bookings(
        conn,
        &format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE start_time >= ?1 ORDER BY start_time ASC"
        ),
        params![fmt_ts(now)],
    )
}

/// Non-cancelled bookings for `staff_id` overlapping `[start, end)`.
pub fn find_staff_overlaps(
    conn: &Connection,
    staff_id: i64,
    start: &NaiveDateTime,
    end: &NaiveDateTime,
) -> Result<Vec<Booking>> {
    query_bookings(
        conn,
        &format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings
             WHERE staff_id = ?1 AND status != 'cancelled' AND start_time < ?3 AND end_time > ?2
             ORDER BY start_time ASC"
        ),
        params![staff_id, fmt_ts(start), fmt_ts(end)],
    )
}

/// Moves a booking to `status`, rejecting transitions out of terminal states.
/// The read and the write share one transaction.
pub fn update_booking_status(conn: &Connection, id: &str, status: BookingStatus) -> Result<Booking> {
    let tx = conn.unchecked_transaction()?;

    let mut booking = tx
        .query_row(
            &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1"),
            params![id],
            parse_booking_row,
        )
        .optional()?
        .ok_or_else(|| AppError::NotFound(format!("booking {id}")))?;

    if !booking.status.can_transition_to(status) {
        return Err(AppError::InvalidTransition {
            from: booking.status,
            to: status,
        });
    }

    tx.execute(
        "UPDATE bookings SET status = ?1 WHERE id = ?2 AND status = ?3",
        params![status.as_str(), id, booking.status.as_str()],
    )?;
    tx.commit()?;

    booking.status = status;
    Ok(booking)
}

fn query_bookings(
    conn: &Connection,
    sql: &str,
    params: &[&dyn rusqlite::types::ToSql],
) -> Result<Vec<Booking>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, parse_booking_row)?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row?);
    }
    Ok(bookings)
}

fn parse_ts(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let raw: String = row.get(idx)?;
    NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_booking_row(row: &rusqlite::Row) -> rusqlite::Result<Booking> {
    let status_str: String = row.get(6)?;
    let status = BookingStatus::parse(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            6,
            Type::Text,
            format!("unknown booking status: {status_str}").into(),
        )
    })?;

    Ok(Booking {
        id: row.get(0)?,
        customer_id: row.get(1)?,
        service_id: row.get(2)?,
        staff_id: row.get(3)?,
        start_time: parse_ts(row, 4)?,
        end_time: parse_ts(row, 5)?,
        status,
        notes: row.get(7)?,
        created_at: parse_ts(row, 8)?,
    })
}

// ── Users ──

pub fn insert_user(
    conn: &Connection,
    email: &str,
    name: Option<&str>,
    role: Role,
    phone: Option<&str>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO users (email, name, role, phone) VALUES (?1, ?2, ?3, ?4)",
        params![email, name, role.as_str(), phone],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_user(conn: &Connection, id: i64) -> Result<Option<User>> {
    let user = conn
        .query_row(
            "SELECT id, email, name, role, phone FROM users WHERE id = ?1",
            params![id],
            parse_user_row,
        )
        .optional()?;
    Ok(user)
}

pub fn list_users_by_role(conn: &Connection, role: Role) -> Result<Vec<User>> {
    let mut stmt = conn.prepare(
        "SELECT id, email, name, role, phone FROM users WHERE role = ?1 ORDER BY name ASC, id ASC",
    )?;
    let rows = stmt.query_map(params![role.as_str()], parse_user_row)?;

    let mut users = vec![];
    for row in rows {
        users.push(row?);
    }
    Ok(users)
}

fn parse_user_row(row: &rusqlite::Row) -> rusqlite::Result<User> {
    let role: String = row.get(3)?;
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        role: Role::parse(&role),
        phone: row.get(4)?,
    })
}

// ── Services ──

pub fn insert_service(
    conn: &Connection,
    name: &str,
    price: f64,
    duration_minutes: i32,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO services (name, price, duration_minutes) VALUES (?1, ?2, ?3)",
        params![name, price, duration_minutes],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_service(conn: &Connection, id: i64) -> Result<Option<Service>> {
    let service = conn
        .query_row(
            "SELECT id, name, description, price, duration_minutes FROM services WHERE id = ?1",
            params![id],
            |row| {
                Ok(Service {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    description: row.get(2)?,
                    price: row.get(3)?,
                    duration_minutes: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(service)
}
