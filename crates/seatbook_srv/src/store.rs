//! SQLite seat and user store.
//!
//! ### Rationale
//!
//! - Each worker thread owns one [Store], i.e. one SQLite connection, so
//!   all database io happens on blocking worker threads.
//! - The database runs in WAL mode so readers never block the writer.
//! - Claiming a seat is a single conditional `UPDATE .. RETURNING`. SQLite
//!   holds the write lock for the whole statement, so the vacancy check and
//!   the status change cannot interleave with another claim.
//! - When a conditional update misses, the row is read back to report why.
//!   That read is not atomic with the update, but it only affects which
//!   error is reported, never whether a seat changes hands.

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use crate::{BookingError, BookingResult};

/// How long a connection waits on a locked database before failing.
const BUSY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS seats (
    id INTEGER PRIMARY KEY,
    flight_id INTEGER NOT NULL,
    seat INTEGER NOT NULL,
    status INTEGER NOT NULL DEFAULT 0,
    user_id INTEGER NULL REFERENCES users(id),
    UNIQUE (flight_id, seat)
);
CREATE INDEX IF NOT EXISTS seats_vacancy
    ON seats (flight_id, status, seat);
CREATE INDEX IF NOT EXISTS seats_owner
    ON seats (user_id);
CREATE TABLE IF NOT EXISTS flight_state (
    flight_id INTEGER PRIMARY KEY,
    state INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS claim_keys (
    user_id INTEGER NOT NULL,
    key TEXT NOT NULL,
    seat_id INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (user_id, key)
);
";

/// The state of a single seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SeatStatus {
    /// Nobody holds this seat.
    Vacant,

    /// Reserved, but not paid for.
    Booked,

    /// Paid for.
    Bought,
}

impl SeatStatus {
    fn code(self) -> i64 {
        match self {
            Self::Vacant => 0,
            Self::Booked => 1,
            Self::Bought => 2,
        }
    }

    fn from_code(code: i64) -> rusqlite::Result<Self> {
        match code {
            0 => Ok(Self::Vacant),
            1 => Ok(Self::Booked),
            2 => Ok(Self::Bought),
            oth => Err(rusqlite::Error::IntegralValueOutOfRange(3, oth)),
        }
    }
}

/// Whether a flight still sells seats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FlightState {
    /// Seats can be booked and bought.
    Open,

    /// Ticket sales have completed.
    SalesClosed,

    /// The flight was canceled.
    Canceled,
}

impl FlightState {
    fn code(self) -> i64 {
        match self {
            Self::Open => 0,
            Self::SalesClosed => 1,
            Self::Canceled => 2,
        }
    }

    fn from_code(code: i64) -> rusqlite::Result<Self> {
        match code {
            0 => Ok(Self::Open),
            1 => Ok(Self::SalesClosed),
            2 => Ok(Self::Canceled),
            oth => Err(rusqlite::Error::IntegralValueOutOfRange(0, oth)),
        }
    }
}

/// A seat row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seat {
    /// The booking id, unique across all flights.
    pub id: i64,

    /// The flight.
    pub flight_id: u32,

    /// The seat number within the flight.
    pub seat: u32,

    /// The seat state.
    pub status: SeatStatus,

    /// The holder, if booked or bought.
    pub user_id: Option<i64>,
}

impl Seat {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            flight_id: row.get(1)?,
            seat: row.get(2)?,
            status: SeatStatus::from_code(row.get(3)?)?,
            user_id: row.get(4)?,
        })
    }
}

const SEAT_COLUMNS: &str = "id, flight_id, seat, status, user_id";

/// A registered user.
#[derive(Debug, Clone)]
pub struct User {
    /// User id.
    pub id: i64,

    /// Normalized email.
    pub email: String,

    /// Encoded password hash, see [crate::Auth].
    pub password_hash: String,
}

/// A connection to the seatbook database.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (creating if needed) the database file at `path`.
    pub fn open(path: &std::path::Path) -> BookingResult<Self> {
        Self::configure(Connection::open(path)?)
    }

    /// A private in-memory database.
    #[cfg(test)]
    pub(crate) fn open_in_memory() -> BookingResult<Self> {
        let store = Self::configure(Connection::open_in_memory()?)?;
        store.migrate()?;
        Ok(store)
    }

    fn configure(conn: Connection) -> BookingResult<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        // in-memory databases answer "memory", which is fine
        let _mode: String =
            conn.query_row("PRAGMA journal_mode = WAL", [], |r| r.get(0))?;
        conn.execute_batch(
            "PRAGMA foreign_keys = ON; PRAGMA synchronous = NORMAL;",
        )?;
        Ok(Self { conn })
    }

    /// Create any missing tables.
    pub fn migrate(&self) -> BookingResult<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Create vacant seats `1..=seat_count` for a flight, skipping seats
    /// that already exist. Returns the number of seats created.
    pub fn fill_flight(
        &mut self,
        flight_id: u32,
        seat_count: u32,
    ) -> BookingResult<usize> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut created = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO seats (flight_id, seat, status)
                 VALUES (?1, ?2, 0)",
            )?;
            for seat in 1..=seat_count {
                created += stmt.execute(params![flight_id, seat])?;
            }
        }
        tx.commit()?;
        tracing::info!(flight_id, created, "filled flight");
        Ok(created)
    }

    /// Register a new user.
    pub fn create_user(
        &self,
        email: &str,
        password_hash: &str,
    ) -> BookingResult<i64> {
        match self.conn.execute(
            "INSERT INTO users (email, password_hash, created_at)
             VALUES (?1, ?2, ?3)",
            params![email, password_hash, crate::now()],
        ) {
            Ok(_) => Ok(self.conn.last_insert_rowid()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(BookingError::EmailTaken)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Look up a user by normalized email.
    pub fn find_user(&self, email: &str) -> BookingResult<Option<User>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, email, password_hash FROM users WHERE email = ?1",
                params![email],
                |r| {
                    Ok(User {
                        id: r.get(0)?,
                        email: r.get(1)?,
                        password_hash: r.get(2)?,
                    })
                },
            )
            .optional()?)
    }

    /// Get the sales state of a flight.
    pub fn flight_state(&self, flight_id: u32) -> BookingResult<FlightState> {
        let code: Option<i64> = self
            .conn
            .query_row(
                "SELECT state FROM flight_state WHERE flight_id = ?1",
                params![flight_id],
                |r| r.get(0),
            )
            .optional()?;
        match code {
            None => Ok(FlightState::Open),
            Some(code) => Ok(FlightState::from_code(code)?),
        }
    }

    /// Set the sales state of a flight. A canceled flight stays canceled.
    pub fn set_flight_state(
        &self,
        flight_id: u32,
        state: FlightState,
    ) -> BookingResult<()> {
        self.conn.execute(
            "INSERT INTO flight_state (flight_id, state) VALUES (?1, ?2)
             ON CONFLICT (flight_id) DO UPDATE SET state = max(state, ?2)",
            params![flight_id, state.code()],
        )?;
        Ok(())
    }

    /// Claim the lowest numbered vacant seat of an open flight.
    ///
    /// With an idempotency key, a repeated call by the same user returns
    /// the seat claimed by the first call instead of claiming another.
    pub fn claim_any(
        &mut self,
        flight_id: u32,
        user_id: i64,
        status: SeatStatus,
        key: Option<&str>,
    ) -> BookingResult<Seat> {
        let Some(key) = key else {
            return match claim_vacant(&self.conn, flight_id, user_id, status)? {
                Some(seat) => Ok(seat),
                None => Err(vacancy_miss(&self.conn, flight_id)?),
            };
        };

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let prior: Option<i64> = tx
            .query_row(
                "SELECT seat_id FROM claim_keys
                 WHERE user_id = ?1 AND key = ?2",
                params![user_id, key],
                |r| r.get(0),
            )
            .optional()?;

        if let Some(seat_id) = prior {
            let seat = seat_by_id(&tx, seat_id)?;
            return match seat {
                Some(seat)
                    if seat.flight_id == flight_id
                        && seat.user_id == Some(user_id)
                        && seat.status == status =>
                {
                    tracing::debug!(seat_id, key, "idempotent claim replay");
                    Ok(seat)
                }
                _ => Err(BookingError::IdempotencyKeyConsumed),
            };
        }

        let seat = match claim_vacant(&tx, flight_id, user_id, status)? {
            Some(seat) => seat,
            None => return Err(vacancy_miss(&tx, flight_id)?),
        };

        tx.execute(
            "INSERT INTO claim_keys (user_id, key, seat_id, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![user_id, key, seat.id, crate::now()],
        )?;
        tx.commit()?;

        Ok(seat)
    }

    /// Claim a specific seat.
    ///
    /// Booking requires the seat to be vacant. Buying requires the seat to
    /// be vacant or booked by `user_id`.
    pub fn claim_seat(
        &self,
        flight_id: u32,
        seat_no: u32,
        user_id: i64,
        status: SeatStatus,
    ) -> BookingResult<Seat> {
        let claimed = self
            .conn
            .query_row(
                &format!(
                    "UPDATE seats SET status = ?1, user_id = ?2
                     WHERE flight_id = ?3 AND seat = ?4
                       AND (status = 0 OR (?1 = 2 AND status = 1
                                           AND user_id = ?2))
                       AND NOT EXISTS (SELECT 1 FROM flight_state
                                       WHERE flight_id = ?3 AND state > 0)
                     RETURNING {SEAT_COLUMNS}"
                ),
                params![status.code(), user_id, flight_id, seat_no],
                Seat::from_row,
            )
            .optional()?;

        if let Some(seat) = claimed {
            return Ok(seat);
        }

        if self.flight_state(flight_id)? != FlightState::Open {
            return Err(BookingError::FlightClosed);
        }

        match self.seat(flight_id, seat_no)? {
            None => Err(BookingError::SeatNotFound),
            Some(Seat {
                status: SeatStatus::Bought,
                ..
            }) => Err(BookingError::TicketAlreadyBought),
            // vacant seats only miss when racing a release, report the
            // claim that beat us
            Some(_) => Err(BookingError::SeatAlreadyBooked),
        }
    }

    /// Release a seat held by `user_id`, which must currently be in the
    /// `expected` state. The seat becomes vacant with no owner.
    pub fn release(
        &self,
        booking_id: i64,
        user_id: i64,
        expected: SeatStatus,
    ) -> BookingResult<Seat> {
        let released = self
            .conn
            .query_row(
                &format!(
                    "UPDATE seats SET status = 0, user_id = NULL
                     WHERE id = ?1 AND status = ?2 AND user_id = ?3
                     RETURNING {SEAT_COLUMNS}"
                ),
                params![booking_id, expected.code(), user_id],
                Seat::from_row,
            )
            .optional()?;

        if let Some(seat) = released {
            return Ok(seat);
        }

        let not_expected = match expected {
            SeatStatus::Bought => BookingError::NotBought,
            _ => BookingError::NotBooked,
        };

        match seat_by_id(&self.conn, booking_id)? {
            None => Err(BookingError::BookingNotFound),
            Some(seat) if seat.status != expected => Err(not_expected),
            Some(_) => Err(BookingError::NotOwner),
        }
    }

    /// Get a seat by flight and seat number.
    pub fn seat(
        &self,
        flight_id: u32,
        seat_no: u32,
    ) -> BookingResult<Option<Seat>> {
        Ok(self
            .conn
            .query_row(
                &format!(
                    "SELECT {SEAT_COLUMNS} FROM seats
                     WHERE flight_id = ?1 AND seat = ?2"
                ),
                params![flight_id, seat_no],
                Seat::from_row,
            )
            .optional()?)
    }

    /// Get a seat by booking id.
    pub fn seat_by_id(&self, booking_id: i64) -> BookingResult<Option<Seat>> {
        seat_by_id(&self.conn, booking_id)
    }

    /// All seats of a flight, ordered by seat number.
    pub fn flight_seats(&self, flight_id: u32) -> BookingResult<Vec<Seat>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {SEAT_COLUMNS} FROM seats
             WHERE flight_id = ?1 ORDER BY seat"
        ))?;
        let seats = stmt
            .query_map(params![flight_id], Seat::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(seats)
    }

    /// Distinct emails of users holding a booked or bought seat on a
    /// flight, sorted.
    pub fn emails_for_flight(
        &self,
        flight_id: u32,
    ) -> BookingResult<Vec<String>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT DISTINCT u.email FROM seats s
             JOIN users u ON s.user_id = u.id
             WHERE s.flight_id = ?1 AND s.status > 0
             ORDER BY u.email",
        )?;
        let emails = stmt
            .query_map(params![flight_id], |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(emails)
    }

    /// Delete idempotency keys created before `before` (micros).
    /// Returns the number deleted.
    pub fn prune_claim_keys(&self, before: i64) -> BookingResult<usize> {
        Ok(self.conn.execute(
            "DELETE FROM claim_keys WHERE created_at < ?1",
            params![before],
        )?)
    }
}

fn seat_by_id(conn: &Connection, booking_id: i64) -> BookingResult<Option<Seat>> {
    Ok(conn
        .query_row(
            &format!("SELECT {SEAT_COLUMNS} FROM seats WHERE id = ?1"),
            params![booking_id],
            Seat::from_row,
        )
        .optional()?)
}

/// The single-statement claim of the lowest numbered vacant seat.
fn claim_vacant(
    conn: &Connection,
    flight_id: u32,
    user_id: i64,
    status: SeatStatus,
) -> BookingResult<Option<Seat>> {
    Ok(conn
        .query_row(
            &format!(
                "UPDATE seats SET status = ?1, user_id = ?2
                 WHERE id = (
                     SELECT id FROM seats
                     WHERE flight_id = ?3 AND status = 0
                     ORDER BY seat LIMIT 1
                 )
                 AND NOT EXISTS (SELECT 1 FROM flight_state
                                 WHERE flight_id = ?3 AND state > 0)
                 RETURNING {SEAT_COLUMNS}"
            ),
            params![status.code(), user_id, flight_id],
            Seat::from_row,
        )
        .optional()?)
}

/// Explain why [claim_vacant] found nothing.
fn vacancy_miss(conn: &Connection, flight_id: u32) -> BookingResult<BookingError> {
    let closed: bool = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM flight_state
                        WHERE flight_id = ?1 AND state > 0)",
        params![flight_id],
        |r| r.get(0),
    )?;
    Ok(if closed {
        BookingError::FlightClosed
    } else {
        BookingError::NoVacantSeat
    })
}

#[cfg(test)]
mod test {
    use super::*;

    const F: u32 = 101;

    fn store_with_users() -> (Store, i64, i64) {
        let mut s = Store::open_in_memory().unwrap();
        s.fill_flight(F, 3).unwrap();
        let alice = s.create_user("alice@example.com", "h").unwrap();
        let bob = s.create_user("bob@example.com", "h").unwrap();
        (s, alice, bob)
    }

    #[test]
    fn fill_is_idempotent() {
        let mut s = Store::open_in_memory().unwrap();
        assert_eq!(3, s.fill_flight(F, 3).unwrap());
        assert_eq!(2, s.fill_flight(F, 5).unwrap());
        assert_eq!(0, s.fill_flight(F, 5).unwrap());
        let seats = s.flight_seats(F).unwrap();
        assert_eq!(
            vec![1, 2, 3, 4, 5],
            seats.iter().map(|s| s.seat).collect::<Vec<_>>()
        );
        assert!(seats.iter().all(|s| s.status == SeatStatus::Vacant));
    }

    #[test]
    fn duplicate_email() {
        let (s, _, _) = store_with_users();
        assert!(matches!(
            s.create_user("alice@example.com", "x"),
            Err(BookingError::EmailTaken)
        ));
        assert_eq!(
            "alice@example.com",
            s.find_user("alice@example.com").unwrap().unwrap().email
        );
        assert!(s.find_user("carol@example.com").unwrap().is_none());
    }

    #[test]
    fn claim_any_takes_lowest_seat_until_full() {
        let (mut s, alice, bob) = store_with_users();

        let a = s.claim_any(F, alice, SeatStatus::Booked, None).unwrap();
        let b = s.claim_any(F, bob, SeatStatus::Bought, None).unwrap();
        let c = s.claim_any(F, alice, SeatStatus::Booked, None).unwrap();

        assert_eq!((1, 2, 3), (a.seat, b.seat, c.seat));
        assert_eq!(Some(alice), a.user_id);
        assert_eq!(SeatStatus::Bought, b.status);

        assert!(matches!(
            s.claim_any(F, bob, SeatStatus::Booked, None),
            Err(BookingError::NoVacantSeat)
        ));
    }

    #[test]
    fn claim_any_unknown_flight() {
        let (mut s, alice, _) = store_with_users();
        assert!(matches!(
            s.claim_any(999, alice, SeatStatus::Booked, None),
            Err(BookingError::NoVacantSeat)
        ));
    }

    #[test]
    fn claim_seat_rules() {
        let (s, alice, bob) = store_with_users();

        s.claim_seat(F, 2, alice, SeatStatus::Booked).unwrap();

        assert!(matches!(
            s.claim_seat(F, 2, bob, SeatStatus::Booked),
            Err(BookingError::SeatAlreadyBooked)
        ));
        assert!(matches!(
            s.claim_seat(F, 2, bob, SeatStatus::Bought),
            Err(BookingError::SeatAlreadyBooked)
        ));
        assert!(matches!(
            s.claim_seat(F, 2, alice, SeatStatus::Booked),
            Err(BookingError::SeatAlreadyBooked)
        ));

        // the holder converts the booking into a ticket
        let seat = s.claim_seat(F, 2, alice, SeatStatus::Bought).unwrap();
        assert_eq!(SeatStatus::Bought, seat.status);
        assert_eq!(Some(alice), seat.user_id);

        assert!(matches!(
            s.claim_seat(F, 2, alice, SeatStatus::Bought),
            Err(BookingError::TicketAlreadyBought)
        ));
        assert!(matches!(
            s.claim_seat(F, 9, alice, SeatStatus::Booked),
            Err(BookingError::SeatNotFound)
        ));
    }

    #[test]
    fn release_rules() {
        let (mut s, alice, bob) = store_with_users();

        let booked = s.claim_any(F, alice, SeatStatus::Booked, None).unwrap();
        let bought = s.claim_any(F, alice, SeatStatus::Bought, None).unwrap();

        assert!(matches!(
            s.release(booked.id, bob, SeatStatus::Booked),
            Err(BookingError::NotOwner)
        ));
        assert!(matches!(
            s.release(booked.id, alice, SeatStatus::Bought),
            Err(BookingError::NotBought)
        ));
        assert!(matches!(
            s.release(bought.id, alice, SeatStatus::Booked),
            Err(BookingError::NotBooked)
        ));
        assert!(matches!(
            s.release(9999, alice, SeatStatus::Booked),
            Err(BookingError::BookingNotFound)
        ));

        let released = s.release(booked.id, alice, SeatStatus::Booked).unwrap();
        assert_eq!(SeatStatus::Vacant, released.status);
        assert_eq!(None, released.user_id);

        let released = s.release(bought.id, alice, SeatStatus::Bought).unwrap();
        assert_eq!(SeatStatus::Vacant, released.status);

        // released twice
        assert!(matches!(
            s.release(bought.id, alice, SeatStatus::Bought),
            Err(BookingError::NotBought)
        ));
    }

    #[test]
    fn closed_flight_rejects_claims() {
        let (mut s, alice, _) = store_with_users();
        let seat = s.claim_any(F, alice, SeatStatus::Booked, None).unwrap();

        s.set_flight_state(F, FlightState::SalesClosed).unwrap();
        assert_eq!(FlightState::SalesClosed, s.flight_state(F).unwrap());

        assert!(matches!(
            s.claim_any(F, alice, SeatStatus::Booked, None),
            Err(BookingError::FlightClosed)
        ));
        assert!(matches!(
            s.claim_seat(F, 3, alice, SeatStatus::Bought),
            Err(BookingError::FlightClosed)
        ));

        // releases still work
        s.release(seat.id, alice, SeatStatus::Booked).unwrap();

        // canceled wins over sales closed, and is never reopened
        s.set_flight_state(F, FlightState::Canceled).unwrap();
        s.set_flight_state(F, FlightState::SalesClosed).unwrap();
        assert_eq!(FlightState::Canceled, s.flight_state(F).unwrap());
    }

    #[test]
    fn idempotent_claim() {
        let (mut s, alice, bob) = store_with_users();

        let first =
            s.claim_any(F, alice, SeatStatus::Booked, Some("k1")).unwrap();
        let again =
            s.claim_any(F, alice, SeatStatus::Booked, Some("k1")).unwrap();
        assert_eq!(first, again);

        // keys are per user
        let other = s.claim_any(F, bob, SeatStatus::Booked, Some("k1")).unwrap();
        assert_ne!(first.id, other.id);

        s.release(first.id, alice, SeatStatus::Booked).unwrap();
        assert!(matches!(
            s.claim_any(F, alice, SeatStatus::Booked, Some("k1")),
            Err(BookingError::IdempotencyKeyConsumed)
        ));

        assert_eq!(0, s.prune_claim_keys(0).unwrap());
        assert_eq!(2, s.prune_claim_keys(crate::now() + 1).unwrap());

        // pruned key claims a fresh seat
        s.claim_any(F, alice, SeatStatus::Booked, Some("k1")).unwrap();
    }

    #[test]
    fn emails_for_flight_distinct() {
        let (mut s, alice, bob) = store_with_users();
        s.create_user("carol@example.com", "h").unwrap();

        s.claim_any(F, bob, SeatStatus::Booked, None).unwrap();
        s.claim_any(F, alice, SeatStatus::Booked, None).unwrap();
        s.claim_any(F, alice, SeatStatus::Bought, None).unwrap();

        assert_eq!(
            vec!["alice@example.com", "bob@example.com"],
            s.emails_for_flight(F).unwrap()
        );
        assert!(s.emails_for_flight(999).unwrap().is_empty());
    }

    #[test]
    fn concurrent_claims_never_share_a_seat() {
        const THREADS: usize = 8;
        const SEATS: u32 = 40;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seats.sqlite3");

        let mut s = Store::open(&path).unwrap();
        s.migrate().unwrap();
        s.fill_flight(F, SEATS).unwrap();
        let users = (0..THREADS)
            .map(|i| s.create_user(&format!("u{i}@example.com"), "h").unwrap())
            .collect::<Vec<_>>();

        let b = std::sync::Arc::new(std::sync::Barrier::new(THREADS));
        let mut all = Vec::with_capacity(THREADS);

        for user in users {
            let path = path.clone();
            let b = b.clone();
            all.push(std::thread::spawn(move || {
                let mut s = Store::open(&path).unwrap();
                b.wait();
                let mut mine = Vec::new();
                loop {
                    match s.claim_any(F, user, SeatStatus::Booked, None) {
                        Ok(seat) => mine.push(seat.seat),
                        Err(BookingError::NoVacantSeat) => break,
                        Err(err) => panic!("{err:?}"),
                    }
                }
                mine
            }));
        }

        let mut claimed = Vec::new();
        for j in all {
            claimed.extend(j.join().unwrap());
        }
        claimed.sort_unstable();

        assert_eq!((1..=SEATS).collect::<Vec<_>>(), claimed);
    }
}
