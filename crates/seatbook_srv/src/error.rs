//! seatbook error types.

/// Reasons a seatbook request can fail.
///
/// The display string of each variant is what the client receives in the
/// `error` property of an `ErrResponse`.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    /// The request body could not be decoded.
    #[error("MalformedPayload: {0}")]
    MalformedPayload(String),

    /// A url path segment could not be parsed.
    #[error("InvalidPathSegment: {0}")]
    InvalidPathSegment(String),

    /// Missing or wrong credentials, an invalid token, or a wrong
    /// event secret.
    #[error("Unauthorized")]
    Unauthorized,

    /// The seat is held by a different user.
    #[error("NotOwner")]
    NotOwner,

    /// No seat row with this booking id.
    #[error("BookingNotFound")]
    BookingNotFound,

    /// No seat row with this flight and seat number.
    #[error("SeatNotFound")]
    SeatNotFound,

    /// Registration with an email that is already registered.
    #[error("EmailTaken")]
    EmailTaken,

    /// Every seat on the flight is booked or bought.
    #[error("NoVacantSeat")]
    NoVacantSeat,

    /// The seat is already booked.
    #[error("SeatAlreadyBooked")]
    SeatAlreadyBooked,

    /// The seat is already bought.
    #[error("TicketAlreadyBought")]
    TicketAlreadyBought,

    /// Cancel booking on a seat that is not booked.
    #[error("NotBooked")]
    NotBooked,

    /// Cancel ticket on a seat that is not bought.
    #[error("NotBought")]
    NotBought,

    /// Ticket sales for the flight have completed, or it was canceled.
    #[error("FlightClosed")]
    FlightClosed,

    /// The idempotency key was used for a seat the user no longer holds.
    #[error("IdempotencyKeyConsumed")]
    IdempotencyKeyConsumed,

    /// Input failed validation.
    #[error("{0}")]
    Invalid(&'static str),

    /// Database failure.
    #[error("Storage: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Filesystem or network failure.
    #[error("Io: {0}")]
    Io(#[from] std::io::Error),
}

impl BookingError {
    /// The http status code used to report this error.
    pub fn status(&self) -> u16 {
        match self {
            Self::MalformedPayload(_) | Self::InvalidPathSegment(_) => 400,
            Self::Unauthorized => 401,
            Self::NotOwner => 403,
            Self::BookingNotFound | Self::SeatNotFound => 404,
            Self::EmailTaken
            | Self::NoVacantSeat
            | Self::SeatAlreadyBooked
            | Self::TicketAlreadyBought
            | Self::NotBooked
            | Self::NotBought
            | Self::FlightClosed
            | Self::IdempotencyKeyConsumed => 409,
            Self::Invalid(_) => 422,
            Self::Storage(_) | Self::Io(_) => 500,
        }
    }
}

/// Seatbook result type.
pub type BookingResult<T> = std::result::Result<T, BookingError>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn status_classes() {
        assert_eq!(401, BookingError::Unauthorized.status());
        assert_eq!(409, BookingError::NoVacantSeat.status());
        assert_eq!(422, BookingError::Invalid("InvalidSeat").status());
        assert_eq!(
            500,
            BookingError::Io(std::io::Error::other("disk")).status()
        );
    }

    #[test]
    fn display_is_error_code() {
        assert_eq!("InvalidSeat", BookingError::Invalid("InvalidSeat").to_string());
        assert_eq!(
            "MalformedPayload: eof",
            BookingError::MalformedPayload("eof".into()).to_string()
        );
    }
}
