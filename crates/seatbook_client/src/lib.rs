//! A client for the seatbook REST server.
//!
//! Note the `blocking_` prefix of every function. This is a hint to the
//! caller that if the function is used in an async context, it should be
//! treated as a blocking operation.

#![deny(missing_docs)]

use url::Url;

/// Reasons a client call can fail.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The server answered with an error status.
    #[error("status {status}: {error}")]
    Status {
        /// The http status code.
        status: u16,

        /// The `error` property of the response body.
        error: String,
    },

    /// The server could not be reached.
    #[error("Transport: {0}")]
    Transport(String),

    /// Reading the response failed.
    #[error("Io: {0}")]
    Io(#[from] std::io::Error),

    /// The response body was not json of the expected shape.
    #[error("Decode: {0}")]
    Decode(#[from] serde_json::Error),

    /// The response body held an unexpected value.
    #[error("InvalidResponse: {0}")]
    InvalidResponse(String),
}

impl ClientError {
    /// The http status code, if the server answered with an error.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The server's error string, if the server answered with an error.
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Status { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Client result type.
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// How a protected request authenticates.
#[derive(Clone, Copy)]
pub enum Auth<'lt> {
    /// Send email and password in the body.
    Credentials {
        /// email
        email: &'lt str,

        /// password
        password: &'lt str,
    },

    /// Send a token from [blocking_login] as a bearer token.
    Token(&'lt str),
}

impl std::fmt::Debug for Auth<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Credentials { email, .. } => f
                .debug_struct("Credentials")
                .field("email", email)
                .finish_non_exhaustive(),
            Self::Token(_) => f.write_str("Token(..)"),
        }
    }
}

/// The state of a seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeatStatus {
    /// Nobody holds the seat.
    Vacant,

    /// Reserved, not yet paid for.
    Booked,

    /// Paid for.
    Bought,
}

/// A seat as returned by the claim and release calls.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    /// The id to cancel this seat with.
    pub booking_id: i64,

    /// flight number
    pub flight_id: u32,

    /// seat number
    pub seat: u32,

    /// seat state after the call
    pub status: SeatStatus,
}

/// A login token.
#[derive(Debug, Clone)]
pub struct Login {
    /// The bearer token.
    pub token: String,

    /// Expiry in micros since the unix epoch.
    pub expires_at: i64,
}

/// One seat of a [Flight].
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightSeat {
    /// booking id
    pub booking_id: i64,

    /// seat number
    pub seat: u32,

    /// seat state
    pub status: SeatStatus,
}

/// Seat overview of a flight.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flight {
    /// flight number
    pub flight_id: u32,

    /// `"open"`, `"salesClosed"` or `"canceled"`.
    pub state: String,

    /// vacant seat count
    pub vacant: usize,

    /// booked seat count
    pub booked: usize,

    /// bought seat count
    pub bought: usize,

    /// every seat, ordered by seat number
    pub seats: Vec<FlightSeat>,
}

/// Register a new user. Returns the new user id.
pub fn blocking_register(
    mut server_url: Url,
    email: &str,
    password: &str,
) -> ClientResult<i64> {
    #[derive(serde::Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Res {
        user_id: i64,
    }

    server_url.set_path("register");
    let body = serde_json::json!({ "email": email, "password": password });
    let res: Res = send(ureq::post(server_url.as_str()), &body.to_string())?;
    Ok(res.user_id)
}

/// Exchange email and password for a login token.
pub fn blocking_login(
    mut server_url: Url,
    email: &str,
    password: &str,
) -> ClientResult<Login> {
    #[derive(serde::Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Res {
        token: String,
        expires_at: String,
    }

    server_url.set_path("api/login_check");
    let body = serde_json::json!({ "email": email, "password": password });
    let res: Res = send(ureq::post(server_url.as_str()), &body.to_string())?;

    Ok(Login {
        token: res.token,
        expires_at: res.expires_at.parse().map_err(|_| {
            ClientError::InvalidResponse(format!(
                "expiresAt {}",
                res.expires_at
            ))
        })?,
    })
}

/// Book a seat. Without a seat number the next vacant seat is booked.
pub fn blocking_book(
    server_url: Url,
    auth: Auth<'_>,
    flight_id: u32,
    seat: Option<u32>,
) -> ClientResult<Booking> {
    claim(server_url, "booking", auth, flight_id, seat, None)
}

/// Buy a seat. Without a seat number the next vacant seat is bought.
/// Buying a seat booked by the same user turns the booking into a ticket.
pub fn blocking_buy(
    server_url: Url,
    auth: Auth<'_>,
    flight_id: u32,
    seat: Option<u32>,
) -> ClientResult<Booking> {
    claim(server_url, "buy_ticket", auth, flight_id, seat, None)
}

/// Book the next vacant seat with an idempotency key. Repeating the call
/// with the same key returns the same seat.
pub fn blocking_book_idempotent(
    server_url: Url,
    auth: Auth<'_>,
    flight_id: u32,
    idempotency_key: &str,
) -> ClientResult<Booking> {
    claim(
        server_url,
        "booking",
        auth,
        flight_id,
        None,
        Some(idempotency_key),
    )
}

/// Buy the next vacant seat with an idempotency key. Repeating the call
/// with the same key returns the same seat.
pub fn blocking_buy_idempotent(
    server_url: Url,
    auth: Auth<'_>,
    flight_id: u32,
    idempotency_key: &str,
) -> ClientResult<Booking> {
    claim(
        server_url,
        "buy_ticket",
        auth,
        flight_id,
        None,
        Some(idempotency_key),
    )
}

/// Cancel a booking.
pub fn blocking_cancel_booking(
    mut server_url: Url,
    auth: Auth<'_>,
    booking_id: i64,
) -> ClientResult<Booking> {
    server_url.set_path(&format!("api/cancel_booking/{booking_id}"));
    authed(server_url, auth, None)
}

/// Cancel a ticket.
pub fn blocking_cancel_ticket(
    mut server_url: Url,
    auth: Auth<'_>,
    booking_id: i64,
) -> ClientResult<Booking> {
    server_url.set_path(&format!("api/cancel_ticket/{booking_id}"));
    authed(server_url, auth, None)
}

/// Get the seat overview of a flight.
pub fn blocking_flight(mut server_url: Url, flight_id: u32) -> ClientResult<Flight> {
    server_url.set_path(&format!("api/flight/{flight_id}"));
    let res = ureq::get(server_url.as_str()).call();
    decode(res)
}

/// Post a flight event. Returns the number of passengers notified.
pub fn blocking_event(
    mut server_url: Url,
    secret_key: &str,
    flight_id: u32,
    event: &str,
) -> ClientResult<usize> {
    #[derive(serde::Deserialize)]
    struct Res {
        notified: usize,
    }

    server_url.set_path("api/event");
    let body = serde_json::json!({
        "data": {
            "secret_key": secret_key,
            "flight_id": flight_id,
            "event": event,
        }
    });
    let res: Res = send(ureq::post(server_url.as_str()), &body.to_string())?;
    Ok(res.notified)
}

fn claim(
    mut server_url: Url,
    kind: &str,
    auth: Auth<'_>,
    flight_id: u32,
    seat: Option<u32>,
    idempotency_key: Option<&str>,
) -> ClientResult<Booking> {
    match seat {
        Some(seat) => {
            server_url.set_path(&format!("api/{kind}/{flight_id}/{seat}"))
        }
        None => server_url.set_path(&format!("api/{kind}/{flight_id}")),
    }
    authed(server_url, auth, idempotency_key)
}

fn authed<T: serde::de::DeserializeOwned>(
    server_url: Url,
    auth: Auth<'_>,
    idempotency_key: Option<&str>,
) -> ClientResult<T> {
    let mut req = ureq::post(server_url.as_str());
    if let Some(key) = idempotency_key {
        req = req.set("Idempotency-Key", key);
    }
    match auth {
        Auth::Credentials { email, password } => {
            let body =
                serde_json::json!({ "email": email, "password": password });
            send(req, &body.to_string())
        }
        Auth::Token(token) => {
            let req = req.set("Authorization", &format!("Bearer {token}"));
            send(req, "")
        }
    }
}

fn send<T: serde::de::DeserializeOwned>(
    req: ureq::Request,
    body: &str,
) -> ClientResult<T> {
    decode(req.send_string(body))
}

fn decode<T: serde::de::DeserializeOwned>(
    res: Result<ureq::Response, ureq::Error>,
) -> ClientResult<T> {
    match res {
        Ok(res) => Ok(serde_json::from_str(&res.into_string()?)?),
        Err(ureq::Error::Status(status, res)) => {
            #[derive(serde::Deserialize)]
            struct ErrRes {
                error: String,
            }

            let body = res.into_string()?;
            let error = match serde_json::from_str::<ErrRes>(&body) {
                Ok(ErrRes { error }) => error,
                Err(_) => body,
            };
            tracing::debug!(status, %error, "seatbook request failed");
            Err(ClientError::Status { status, error })
        }
        Err(ureq::Error::Transport(err)) => {
            Err(ClientError::Transport(err.to_string()))
        }
    }
}
