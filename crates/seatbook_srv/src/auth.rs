//! Password hashing and login tokens.
//!
//! Passwords are stored as PBKDF2-HMAC-SHA256 with a random salt:
//! `pbkdf2-sha256$<iterations>$<b64 salt>$<b64 hash>`.
//!
//! Login tokens are HS256 JWTs signed with the server's token secret,
//! carrying the user id as `sub` and the expiry as `exp`.

use base64::prelude::*;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::{BookingError, BookingResult};

const HASH_SCHEME: &str = "pbkdf2-sha256";
const SALT_LEN: usize = 16;

fn pbkdf2_sha256(password: &[u8], salt: &[u8], iterations: u32) -> [u8; 32] {
    let mut out = [0; 32];
    pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut out);
    out
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct Claims {
    sub: String,
    /// Seconds since the epoch.
    exp: u64,
}

/// Password and token operations, keyed by the server config.
pub struct Auth {
    token_secret: Vec<u8>,
    token_lifetime_micros: i64,
    iterations: u32,
    decoy_hash: String,
}

impl Auth {
    /// Construct from the relevant [crate::Config] fields.
    pub fn new(config: &crate::Config) -> Self {
        let iterations = config.password_hash_iterations.max(1);
        Self {
            token_secret: config.token_secret.clone(),
            token_lifetime_micros: config.token_lifetime.as_micros() as i64,
            iterations,
            decoy_hash: hash_password_with(b"decoy", [0; SALT_LEN], iterations),
        }
    }

    /// Hash a password for storage.
    pub fn hash_password(&self, password: &str) -> String {
        use rand::Rng;

        let mut salt = [0; SALT_LEN];
        rand::thread_rng().fill(&mut salt);
        hash_password_with(password.as_bytes(), salt, self.iterations)
    }

    /// Check a password against a stored hash.
    ///
    /// Pass `None` when there is no such user, so that the response time
    /// does not reveal whether the email is registered.
    pub fn verify_password(&self, password: &str, stored: Option<&str>) -> bool {
        match stored {
            Some(stored) => verify_password(password, stored),
            None => {
                let _ = verify_password(password, &self.decoy_hash);
                false
            }
        }
    }

    /// Issue a login token for a user.
    /// Returns the token and its expiry in micros since the epoch.
    pub fn issue_token(&self, user_id: i64) -> BookingResult<(String, i64)> {
        self.issue_token_at(user_id, crate::now())
    }

    fn issue_token_at(
        &self,
        user_id: i64,
        now: i64,
    ) -> BookingResult<(String, i64)> {
        let exp = (now + self.token_lifetime_micros).div_euclid(1_000_000);
        let claims = Claims {
            sub: user_id.to_string(),
            exp: exp.max(0) as u64,
        };

        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(&self.token_secret),
        )
        .map_err(std::io::Error::other)?;

        Ok((token, exp * 1_000_000))
    }

    /// Verify a login token, returning the user id it was issued to.
    pub fn verify_token(&self, token: &str) -> BookingResult<i64> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let data = jsonwebtoken::decode::<Claims>(
            token,
            &DecodingKey::from_secret(&self.token_secret),
            &validation,
        )
        .map_err(|err| {
            tracing::debug!(?err, "rejected token");
            BookingError::Unauthorized
        })?;

        data.claims
            .sub
            .parse()
            .map_err(|_| BookingError::Unauthorized)
    }
}

fn hash_password_with(
    password: &[u8],
    salt: [u8; SALT_LEN],
    iterations: u32,
) -> String {
    let hash = pbkdf2_sha256(password, &salt, iterations);
    format!(
        "{HASH_SCHEME}${iterations}${}${}",
        BASE64_URL_SAFE_NO_PAD.encode(salt),
        BASE64_URL_SAFE_NO_PAD.encode(hash),
    )
}

fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.split('$');
    let (Some(HASH_SCHEME), Some(iterations), Some(salt), Some(hash), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };

    let Ok(iterations) = iterations.parse::<u32>() else {
        return false;
    };
    let (Ok(salt), Ok(hash)) = (
        BASE64_URL_SAFE_NO_PAD.decode(salt),
        BASE64_URL_SAFE_NO_PAD.decode(hash),
    ) else {
        return false;
    };

    let computed = pbkdf2_sha256(password.as_bytes(), &salt, iterations);
    computed[..].ct_eq(&hash[..]).into()
}

#[cfg(test)]
mod test {
    use super::*;

    fn auth() -> Auth {
        Auth::new(&crate::Config::testing())
    }

    #[test]
    fn pbkdf2_rfc7914_vector() {
        // RFC 7914 section 11, first 32 bytes of the PBKDF2-HMAC-SHA256
        // test vector with P="passwd", S="salt", c=1.
        let dk = pbkdf2_sha256(b"passwd", b"salt", 1);
        assert_eq!(
            [
                0x55, 0xac, 0x04, 0x6e, 0x56, 0xe3, 0x08, 0x9f, 0xec, 0x16,
                0x91, 0xc2, 0x25, 0x44, 0xb6, 0x05, 0xf9, 0x41, 0x85, 0x21,
                0x6d, 0xde, 0x04, 0x65, 0xe6, 0x8b, 0x9d, 0x57, 0xc2, 0x0d,
                0xac, 0xbc,
            ],
            dk
        );
    }

    #[test]
    fn password_happy() {
        let a = auth();
        let stored = a.hash_password("hunter2");
        assert!(stored.starts_with("pbkdf2-sha256$1000$"));
        assert!(a.verify_password("hunter2", Some(&stored)));
        assert!(!a.verify_password("hunter3", Some(&stored)));
    }

    #[test]
    fn password_salted() {
        let a = auth();
        assert_ne!(a.hash_password("same"), a.hash_password("same"));
    }

    #[test]
    fn password_unknown_user_fails() {
        assert!(!auth().verify_password("decoy", None));
    }

    #[test]
    fn password_garbage_stored_fails() {
        let a = auth();
        for stored in ["", "plain", "pbkdf2-sha256$x$AA$AA", "md5$1$AA$AA"] {
            assert!(!a.verify_password("pw", Some(stored)));
        }
    }

    #[test]
    fn token_happy() {
        let a = auth();
        let (token, expires_at) = a.issue_token(42).unwrap();
        assert!(expires_at > crate::now());
        assert_eq!(3, token.split('.').count());
        assert_eq!(42, a.verify_token(&token).unwrap());
    }

    #[test]
    fn token_expired() {
        let a = auth();
        let long_ago = crate::now() - a.token_lifetime_micros - 2_000_000;
        let (token, expires_at) = a.issue_token_at(42, long_ago).unwrap();
        assert!(expires_at < crate::now());
        assert!(matches!(
            a.verify_token(&token),
            Err(BookingError::Unauthorized)
        ));
    }

    #[test]
    fn token_tampered() {
        let a = auth();
        let (token, _) = a.issue_token(42).unwrap();
        let parts = token.split('.').collect::<Vec<_>>();

        let (forged, _) = a.issue_token(43).unwrap();
        let forged_payload = forged.split('.').nth(1).unwrap();

        let bad = format!("{}.{forged_payload}.{}", parts[0], parts[2]);
        assert!(a.verify_token(&bad).is_err());
        assert!(a.verify_token("nope").is_err());
        assert!(a.verify_token("").is_err());
    }

    #[test]
    fn token_unsigned_rejected() {
        let a = auth();
        let (token, _) = a.issue_token(42).unwrap();
        let payload = token.split('.').nth(1).unwrap();
        let none = BASE64_URL_SAFE_NO_PAD.encode(r#"{"alg":"none","typ":"JWT"}"#);
        assert!(a.verify_token(&format!("{none}.{payload}.")).is_err());
    }

    #[test]
    fn token_other_secret() {
        let (token, _) = auth().issue_token(42).unwrap();
        let other = Auth::new(&crate::Config {
            token_secret: b"other".to_vec(),
            ..crate::Config::testing()
        });
        assert!(other.verify_token(&token).is_err());
    }
}
