#![deny(missing_docs)]
//! Seatbook server is an HTTP REST server for booking and buying seats on
//! airline flights.
//!
//! Every seat of a flight is a row in a SQLite database with one of three
//! states: vacant, booked or bought. Users register with an email and a
//! password, and then claim and release seats through the REST API. An
//! upstream flight operations system can post flight events, at which point
//! booked passengers are notified by email.
//!
//! For additional details, please see the [spec].

/// This is a documentation module containing the seatbook REST spec.
///
/// #### 1. Types
///
/// - `FlightId` - positive integer flight number, in the url path.
/// - `SeatNo` - seat number within a flight, `1..=seats_per_flight`.
/// - `BookingId` - integer id of a seat row, unique across all flights.
/// - `Status` - one of `"vacant"`, `"booked"`, `"bought"`.
/// - `I64` - string containing an i64 number indicating the number of
///           microseconds since the unix epoch.
///
/// ```text
/// Credentials = { "email": string, "password": string }
/// SeatResponse = {
///   "bookingId": BookingId,
///   "flightId": FlightId,
///   "seat": SeatNo,
///   "status": Status
/// }
/// FlightResponse = {
///   "flightId": FlightId,
///   "state": "open" | "salesClosed" | "canceled",
///   "vacant": integer,
///   "booked": integer,
///   "bought": integer,
///   "seats": [{ "bookingId": BookingId, "seat": SeatNo, "status": Status }]
/// }
/// ErrResponse = { "error": string }
/// ```
///
/// Every error, including `413` for request bodies over the configured
/// limit, is answered with an `ErrResponse`.
///
/// #### 2. REST API
///
/// ##### 2.1. In Brief
///
/// - `POST /register`
///   - Request Body: `Credentials`
///   - Response Body: `{ "userId": integer, "email": string }`
/// - `POST /api/login_check`
///   - Request Body: `Credentials`
///   - Response Body: `{ "token": string, "expiresAt": I64 }`
/// - `POST /api/booking/<FlightId>` and `POST /api/booking/<FlightId>/<SeatNo>`
/// - `POST /api/buy_ticket/<FlightId>` and `POST /api/buy_ticket/<FlightId>/<SeatNo>`
/// - `POST /api/cancel_booking/<BookingId>`
/// - `POST /api/cancel_ticket/<BookingId>`
///   - Request Body: `Credentials`, or empty with a bearer token
///   - Response Body: `SeatResponse | ErrResponse`
/// - `GET /api/flight/<FlightId>`
///   - Response Body: `FlightResponse | ErrResponse`
/// - `POST /api/event`
///   - Request Body: `{ "data": { "secret_key": string, "flight_id": FlightId, "event": string } }`
///   - Response Body: `{ "message": string, "notified": integer } | ErrResponse`
/// - `GET /health`
///   - Response Body: `{}`
///
/// ##### 2.2. Authentication
///
/// Every `/api` request except `/api/flight` and `/api/event` must be
/// authenticated, either with an `Authorization: Bearer <token>` header
/// carrying a token from `/api/login_check`, or with `Credentials` in
/// the request body. When the header is present the body is ignored.
///
/// - The server MUST respond `401` if neither is present or valid.
/// - The server MUST respond `401` if the token is expired or its
///   signature does not verify.
///
/// ##### 2.3. Claiming seats
///
/// - A claim without a seat number takes the lowest numbered vacant seat.
///   The selection and the status change are one atomic conditional update,
///   two concurrent claims can never be handed the same seat.
/// - The server MUST respond `409 NoVacantSeat` if the flight is full.
/// - Booking a specific seat requires the seat to be vacant.
/// - Buying a specific seat requires the seat to be vacant, or booked by
///   the requesting user (the booking becomes a ticket).
/// - The server MUST respond `422 InvalidSeat` for a seat number outside
///   of `1..=seats_per_flight`.
/// - The server MUST respond `409 FlightClosed` once ticket sales for the
///   flight have completed or the flight was canceled.
/// - A claim without a seat number MAY carry an `Idempotency-Key` header.
///   A replay of the same key by the same user returns the seat claimed
///   the first time, as long as that user still holds it.
///
/// ##### 2.4. Releasing seats
///
/// - `cancel_booking` requires the seat to be booked, `cancel_ticket`
///   requires it to be bought. Otherwise `409 NotBooked` / `409 NotBought`.
/// - The server MUST respond `403 NotOwner` if another user holds the seat.
/// - A released seat is vacant and has no owner.
///
/// ##### 2.5. Flight events
///
/// - The server MUST respond `401` if `secret_key` does not match.
/// - `flight_canceled` closes the flight and sends one email to every
///   distinct user holding a booked or bought seat on it.
/// - `flight_ticket_sales_completed` closes the flight.
/// - Any other event is rejected with `422 UnknownEvent`.
#[cfg(doc)]
pub mod spec {}

fn now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .expect("InvalidSystemTime")
        .as_micros() as i64
}

mod config;
pub use config::*;

mod error;
pub use error::*;

mod parse;
use parse::*;

mod auth;
pub use auth::*;

mod store;
pub use store::*;

mod mail;
pub use mail::*;

mod event;
pub use event::*;

mod tls;
use tls::*;

mod http;
use http::*;

mod server;
pub use server::*;
