//! config types.

/// Configuration for running a SeatbookSrv.
pub struct Config {
    /// Worker thread count.
    ///
    /// Each worker thread owns its own SQLite connection and performs
    /// blocking database io. Writers serialize on the database lock,
    /// readers do not, so having more workers than cpus is beneficial.
    ///
    /// Defaults:
    /// - `testing = 2`
    /// - `production = 4 * cpu_count`
    pub worker_thread_count: usize,

    /// The duration worker threads will sleep between shutdown checks.
    ///
    /// Defaults:
    /// - `testing = 10ms`
    /// - `production = 2s`
    pub request_listen_duration: std::time::Duration,

    /// The address(es) at which to listen.
    ///
    /// Defaults:
    /// - `testing = "[127.0.0.1:0]"`
    /// - `production = "[0.0.0.0:443, [::]:443]"`
    pub listen_address_list: Vec<std::net::SocketAddr>,

    /// Path to the SQLite database file.
    ///
    /// If `None`, a database is created in a temporary directory that is
    /// removed when the server is dropped.
    ///
    /// Defaults:
    /// - `testing = None`
    /// - `production = "seatbook.sqlite3"`
    pub database_path: Option<std::path::PathBuf>,

    /// The number of seats on every flight. Seat numbers run from
    /// 1 through this value inclusive.
    ///
    /// Defaults:
    /// - `testing = 150`
    /// - `production = 150`
    pub seats_per_flight: u32,

    /// Shared secret the flight operations system must send along with
    /// every posted flight event.
    ///
    /// Defaults:
    /// - `testing = "testing-event-secret"`
    /// - `production = ""` (must be configured, empty never matches)
    pub event_secret: String,

    /// HS256 key used to sign login tokens.
    ///
    /// Defaults:
    /// - `testing = "testing-token-secret"`
    /// - `production = 32 random bytes` (tokens do not survive a restart)
    pub token_secret: Vec<u8>,

    /// How long a login token stays valid.
    ///
    /// Defaults:
    /// - `testing = 1h`
    /// - `production = 1h`
    pub token_lifetime: std::time::Duration,

    /// PBKDF2 iteration count for newly hashed passwords.
    ///
    /// Defaults:
    /// - `testing = 1_000`
    /// - `production = 600_000`
    pub password_hash_iterations: u32,

    /// How long an idempotency key of a seat claim is remembered.
    ///
    /// Defaults:
    /// - `testing = 10m`
    /// - `production = 24h`
    pub claim_key_lifetime: std::time::Duration,

    /// The interval at which expired idempotency keys are pruned.
    ///
    /// Defaults:
    /// - `testing = 10s`
    /// - `production = 60s`
    pub prune_interval: std::time::Duration,

    /// Directory into which outgoing mail is spooled as one file per
    /// message. If `None`, outgoing mail is only logged.
    ///
    /// Default:
    /// - `None`
    pub mail_spool_dir: Option<std::path::PathBuf>,

    /// The `From` address of outgoing mail.
    ///
    /// Default:
    /// - `"noreply@seatbook.invalid"`
    pub mail_from: String,

    /// The path to a TLS certificate file.
    ///
    /// Must be provided when `tls_key` is provided.
    ///
    /// Default:
    /// - `None`
    pub tls_cert: Option<std::path::PathBuf>,

    /// The path to a TLS key file.
    ///
    /// Must be provided when `tls_cert` is provided.
    ///
    /// Default:
    /// - `None`
    pub tls_key: Option<std::path::PathBuf>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // secrets are redacted
        f.debug_struct("Config")
            .field("worker_thread_count", &self.worker_thread_count)
            .field("request_listen_duration", &self.request_listen_duration)
            .field("listen_address_list", &self.listen_address_list)
            .field("database_path", &self.database_path)
            .field("seats_per_flight", &self.seats_per_flight)
            .field("token_lifetime", &self.token_lifetime)
            .field("password_hash_iterations", &self.password_hash_iterations)
            .field("claim_key_lifetime", &self.claim_key_lifetime)
            .field("prune_interval", &self.prune_interval)
            .field("mail_spool_dir", &self.mail_spool_dir)
            .field("mail_from", &self.mail_from)
            .field("tls_cert", &self.tls_cert)
            .field("tls_key", &self.tls_key)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Get a seatbook_srv config suitable for testing.
    pub fn testing() -> Self {
        Self {
            worker_thread_count: 2,
            request_listen_duration: std::time::Duration::from_millis(10),
            listen_address_list: vec![(std::net::Ipv4Addr::LOCALHOST, 0).into()],
            database_path: None,
            seats_per_flight: 150,
            event_secret: "testing-event-secret".to_string(),
            token_secret: b"testing-token-secret".to_vec(),
            token_lifetime: std::time::Duration::from_secs(60 * 60),
            password_hash_iterations: 1_000,
            claim_key_lifetime: std::time::Duration::from_secs(60 * 10),
            prune_interval: std::time::Duration::from_secs(10),
            mail_spool_dir: None,
            mail_from: "noreply@seatbook.invalid".to_string(),
            tls_cert: None,
            tls_key: None,
        }
    }

    /// Get a seatbook_srv config suitable for production.
    pub fn production() -> Self {
        use rand::Rng;

        let mut token_secret = vec![0; 32];
        rand::thread_rng().fill(&mut token_secret[..]);

        Self {
            worker_thread_count: num_cpus::get() * 4,
            request_listen_duration: std::time::Duration::from_secs(2),
            listen_address_list: vec![
                (std::net::Ipv4Addr::UNSPECIFIED, 443).into(),
                (std::net::Ipv6Addr::UNSPECIFIED, 443).into(),
            ],
            database_path: Some("seatbook.sqlite3".into()),
            seats_per_flight: 150,
            event_secret: String::new(),
            token_secret,
            token_lifetime: std::time::Duration::from_secs(60 * 60),
            password_hash_iterations: 600_000,
            claim_key_lifetime: std::time::Duration::from_secs(60 * 60 * 24),
            prune_interval: std::time::Duration::from_secs(60),
            mail_spool_dir: None,
            mail_from: "noreply@seatbook.invalid".to_string(),
            tls_cert: None,
            tls_key: None,
        }
    }
}
