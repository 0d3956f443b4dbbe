use crate::{BookingError, BookingResult};

/// Longest accepted email address, see RFC 5321 section 4.5.3.1.
const MAX_EMAIL_LEN: usize = 254;

/// Longest accepted idempotency key.
const MAX_IDEMPOTENCY_KEY_LEN: usize = 64;

/// Email and password from a request body: [crate::spec#1-types].
pub struct Credentials {
    /// normalized email
    pub email: String,

    /// password
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

#[derive(serde::Deserialize)]
struct RawCredentials {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

impl Credentials {
    /// Parse credentials that must be present, as in register and login
    /// requests. Empty or badly shaped input is a validation error.
    pub fn try_from_slice(slice: &[u8]) -> BookingResult<Self> {
        Self::try_from_optional_slice(slice)?
            .ok_or(BookingError::Invalid("InvalidEmailOrPassword"))
    }

    /// Parse credentials that may be absent, as in requests that can
    /// authenticate with a bearer token instead. An empty body, or a body
    /// without either property, yields `None`.
    pub fn try_from_optional_slice(slice: &[u8]) -> BookingResult<Option<Self>> {
        if slice.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        let raw: RawCredentials = serde_json::from_slice(slice)
            .map_err(|err| BookingError::MalformedPayload(err.to_string()))?;

        let (email, password) = match (raw.email, raw.password) {
            (None, None) => return Ok(None),
            (Some(email), Some(password)) => (email, password),
            _ => return Err(BookingError::Invalid("InvalidEmailOrPassword")),
        };

        if password.is_empty() {
            return Err(BookingError::Invalid("InvalidEmailOrPassword"));
        }

        Ok(Some(Self {
            email: normalize_email(&email)?,
            password,
        }))
    }
}

/// Trim and lowercase an email, rejecting anything not shaped like
/// `local@domain`.
pub fn normalize_email(email: &str) -> BookingResult<String> {
    let email = email.trim().to_lowercase();

    if email.is_empty() || email.len() > MAX_EMAIL_LEN {
        return Err(BookingError::Invalid("InvalidEmailOrPassword"));
    }

    match email.split_once('@') {
        Some((local, domain))
            if !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace) =>
        {
            Ok(email)
        }
        _ => Err(BookingError::Invalid("InvalidEmailOrPassword")),
    }
}

/// A posted flight event: [crate::spec#25-flight-events].
#[derive(Debug)]
pub struct ParsedEvent {
    /// secret_key
    pub secret_key: String,

    /// flight_id
    pub flight_id: u32,

    /// event
    pub event: String,
}

impl ParsedEvent {
    /// Parse event from a slice.
    pub fn try_from_slice(slice: &[u8]) -> BookingResult<Self> {
        #[derive(serde::Deserialize)]
        struct Outer {
            data: Inner,
        }

        #[derive(serde::Deserialize)]
        struct Inner {
            secret_key: String,
            flight_id: u32,
            event: String,
        }

        let out: Outer = serde_json::from_slice(slice)
            .map_err(|err| BookingError::MalformedPayload(err.to_string()))?;

        Ok(Self {
            secret_key: out.data.secret_key,
            flight_id: out.data.flight_id,
            event: out.data.event,
        })
    }
}

/// Validate an optional `Idempotency-Key` header value.
pub fn parse_idempotency_key(
    key: Option<&str>,
) -> BookingResult<Option<String>> {
    match key {
        None => Ok(None),
        Some(key)
            if !key.is_empty()
                && key.len() <= MAX_IDEMPOTENCY_KEY_LEN
                && key.bytes().all(|b| b.is_ascii_graphic()) =>
        {
            Ok(Some(key.to_string()))
        }
        Some(_) => Err(BookingError::Invalid("InvalidIdempotencyKey")),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn credentials_normalize_email() {
        let c = Credentials::try_from_slice(
            br#"{"email":"  Alice@Example.COM ","password":"pw"}"#,
        )
        .unwrap();
        assert_eq!("alice@example.com", c.email);
        assert_eq!("pw", c.password);
    }

    #[test]
    fn credentials_absent() {
        assert!(Credentials::try_from_optional_slice(b"").unwrap().is_none());
        assert!(Credentials::try_from_optional_slice(b"{}")
            .unwrap()
            .is_none());
        assert!(matches!(
            Credentials::try_from_slice(b"{}"),
            Err(BookingError::Invalid("InvalidEmailOrPassword"))
        ));
    }

    #[test]
    fn credentials_reject() {
        for body in [
            &br#"{"email":"alice@example.com"}"#[..],
            br#"{"email":"alice@example.com","password":""}"#,
            br#"{"email":"alice","password":"pw"}"#,
            br#"{"email":"@example.com","password":"pw"}"#,
            br#"{"email":"a@b@c","password":"pw"}"#,
            br#"{"email":"a b@c","password":"pw"}"#,
        ] {
            assert!(
                matches!(
                    Credentials::try_from_slice(body),
                    Err(BookingError::Invalid(_))
                ),
                "{}",
                String::from_utf8_lossy(body),
            );
        }

        assert!(matches!(
            Credentials::try_from_slice(b"not json"),
            Err(BookingError::MalformedPayload(_))
        ));
    }

    #[test]
    fn credentials_debug_hides_password() {
        let c = Credentials::try_from_slice(
            br#"{"email":"a@b.c","password":"hunter2"}"#,
        )
        .unwrap();
        assert!(!format!("{c:?}").contains("hunter2"));
    }

    #[test]
    fn event_parse() {
        let e = ParsedEvent::try_from_slice(
            br#"{"data":{"secret_key":"s","flight_id":7,"event":"flight_canceled"}}"#,
        )
        .unwrap();
        assert_eq!("s", e.secret_key);
        assert_eq!(7, e.flight_id);
        assert_eq!("flight_canceled", e.event);

        assert!(ParsedEvent::try_from_slice(br#"{"flight_id":7}"#).is_err());
    }

    #[test]
    fn idempotency_key() {
        assert_eq!(None, parse_idempotency_key(None).unwrap());
        assert_eq!(
            Some("abc-123".to_string()),
            parse_idempotency_key(Some("abc-123")).unwrap()
        );
        assert!(parse_idempotency_key(Some("")).is_err());
        assert!(parse_idempotency_key(Some("has space")).is_err());
        assert!(parse_idempotency_key(Some(&"k".repeat(65))).is_err());
    }
}
