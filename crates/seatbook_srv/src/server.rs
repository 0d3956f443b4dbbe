//! seatbook http server types.

use std::sync::Arc;

use crate::*;

/// Print out a message if this thread dies.
struct ThreadGuard(&'static str);

impl Drop for ThreadGuard {
    fn drop(&mut self) {
        tracing::debug!("{}", self.0);
    }
}

/// Where the database lives.
///
/// Holds the temporary directory, if one was created, so that it is
/// removed only after every worker connection has been closed.
#[derive(Clone)]
struct Database {
    path: std::path::PathBuf,
    _tmp: Option<Arc<tempfile::TempDir>>,
}

impl Database {
    fn new(config: &Config) -> std::io::Result<Self> {
        match &config.database_path {
            Some(path) => Ok(Self {
                path: path.clone(),
                _tmp: None,
            }),
            None => {
                let tmp = tempfile::Builder::new().prefix("seatbook").tempdir()?;
                Ok(Self {
                    path: tmp.path().join("seatbook.sqlite3"),
                    _tmp: Some(Arc::new(tmp)),
                })
            }
        }
    }

    fn open(&self) -> std::io::Result<Store> {
        Store::open(&self.path).map_err(std::io::Error::other)
    }
}

/// An actual seatbook_srv server instance.
///
/// Requests are accepted by an async http front end and handed to a pool of
/// os thread workers, each with its own database connection.
pub struct SeatbookSrv {
    cont: Arc<std::sync::atomic::AtomicBool>,
    workers: Vec<std::thread::JoinHandle<std::io::Result<()>>>,
    addrs: Vec<std::net::SocketAddr>,
    server: Option<Server>,
    database: Database,
}

impl Drop for SeatbookSrv {
    fn drop(&mut self) {
        let _g = ThreadGuard("Server Shutdown Complete!");

        tracing::debug!("begin server shutdown...");
        let _ = self.shutdown();
    }
}

impl SeatbookSrv {
    /// Construct a new SeatbookSrv instance.
    pub fn new(config: Config) -> std::io::Result<Self> {
        let config = Arc::new(config);

        // atomic flag for telling worker threads to shutdown
        let cont = Arc::new(std::sync::atomic::AtomicBool::new(true));

        let database = Database::new(&config)?;
        database
            .open()?
            .migrate()
            .map_err(std::io::Error::other)?;
        tracing::info!(path = ?database.path, "Database ready");

        let auth = Arc::new(Auth::new(&config));
        let mailer = mailer_from_config(&config);

        let sconf = ServerConfig {
            addrs: config.listen_address_list.clone(),
            worker_thread_count: config.worker_thread_count,
            tls_config: TlsConfig::from_config(&config)?,
        };

        // start the actual http server
        let server = Server::new(config.clone(), sconf)?;

        // get the address that was assigned
        let addrs = server.server_addrs().to_vec();
        tracing::info!(?addrs, "Listening");

        // spawn our worker threads, each with its own connection
        let mut workers = Vec::with_capacity(config.worker_thread_count + 1);
        for _ in 0..config.worker_thread_count {
            let config = config.clone();
            let store = database.open()?;
            let auth = auth.clone();
            let mailer = mailer.clone();
            let recv = server.receiver().clone();
            workers.push(std::thread::spawn(move || {
                worker(config, store, auth, mailer, recv)
            }));
        }

        // also set up a worker for pruning expired idempotency keys
        let prune_cont = cont.clone();
        let prune_store = database.open()?;
        workers.push(std::thread::spawn(move || {
            prune_worker(config, prune_cont, prune_store)
        }));

        Ok(Self {
            cont,
            workers,
            addrs,
            server: Some(server),
            database,
        })
    }

    /// Shutdown the server, returning an error result if any
    /// of the worker threads had panicked.
    pub fn shutdown(&mut self) -> std::io::Result<()> {
        let mut is_err = false;
        self.cont.store(false, std::sync::atomic::Ordering::SeqCst);
        drop(self.server.take());
        while let Some(worker) = self.workers.pop() {
            tracing::debug!(
                "waiting on {} threads to close...",
                self.workers.len() + 1
            );
            if !matches!(worker.join(), Ok(Ok(()))) {
                is_err = true;
            }
        }
        tracing::debug!("all threads closed.");
        if is_err {
            Err(std::io::Error::other("Failure shutting down worker thread"))
        } else {
            Ok(())
        }
    }

    /// Get the bound listening addresses of this server.
    pub fn listen_addrs(&self) -> &[std::net::SocketAddr] {
        self.addrs.as_slice()
    }

    /// Get the first bound listening address of this server.
    pub fn listen_addr(&self) -> std::net::SocketAddr {
        self.addrs[0]
    }

    /// Print the address server started on
    pub fn print_addrs(&self) {
        println!("#seatbook_srv#running#");
        for addr in self.addrs.iter() {
            // print these incase someone wants to parse for them
            println!("#seatbook_srv#listening#{addr:?}#");
        }
    }

    /// Create the vacant seats of a flight in this server's database.
    /// Returns the number of seats created.
    pub fn fill_flight(
        &self,
        flight_id: u32,
        seat_count: u32,
    ) -> std::io::Result<usize> {
        self.database
            .open()?
            .fill_flight(flight_id, seat_count)
            .map_err(std::io::Error::other)
    }
}

fn prune_worker(
    config: Arc<Config>,
    cont: Arc<std::sync::atomic::AtomicBool>,
    store: Store,
) -> std::io::Result<()> {
    let _g = ThreadGuard("prune_worker thread has ended");

    let mut last_check = std::time::Instant::now();

    while cont.load(std::sync::atomic::Ordering::SeqCst) {
        std::thread::sleep(config.request_listen_duration);

        if last_check.elapsed() >= config.prune_interval {
            last_check = std::time::Instant::now();

            let before =
                crate::now() - config.claim_key_lifetime.as_micros() as i64;
            match store.prune_claim_keys(before) {
                Ok(0) => (),
                Ok(pruned) => tracing::debug!(pruned, "pruned claim keys"),
                Err(err) => tracing::warn!(?err, "failed to prune claim keys"),
            }
        }
    }

    Ok(())
}

fn worker(
    config: Arc<Config>,
    mut store: Store,
    auth: Arc<Auth>,
    mailer: DynMailer,
    recv: HttpReceiver,
) -> std::io::Result<()> {
    let _g = ThreadGuard("worker thread has ended");

    // the channel closes when the http server shuts down
    while let Some((req, res)) = recv.recv() {
        let handler = Handler {
            config: &config,
            store: &mut store,
            auth: &auth,
            mailer: &mailer,
            res,
        };

        handler.handle(req);
    }

    Ok(())
}

/// Seat json shape: [crate::spec#1-types].
#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct SeatResponse {
    booking_id: i64,
    flight_id: u32,
    seat: u32,
    status: SeatStatus,
}

impl From<Seat> for SeatResponse {
    fn from(seat: Seat) -> Self {
        Self {
            booking_id: seat.id,
            flight_id: seat.flight_id,
            seat: seat.seat,
            status: seat.status,
        }
    }
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct FlightSeat {
    booking_id: i64,
    seat: u32,
    status: SeatStatus,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct FlightResponse {
    flight_id: u32,
    state: FlightState,
    vacant: usize,
    booked: usize,
    bought: usize,
    seats: Vec<FlightSeat>,
}

type HandlerResult = BookingResult<(u16, Vec<u8>)>;

fn json_ok<T: serde::Serialize>(value: &T) -> HandlerResult {
    Ok((
        200,
        serde_json::to_vec(value).map_err(std::io::Error::other)?,
    ))
}

struct Handler<'lt> {
    config: &'lt Config,
    store: &'lt mut Store,
    auth: &'lt Auth,
    mailer: &'lt DynMailer,
    res: HttpRespondCb,
}

impl Handler<'_> {
    /// Wrap the handle call so we can respond to the client with errors.
    pub fn handle(mut self, req: HttpRequest) {
        match self.handle_inner(req) {
            Ok((status, body)) => self.respond(status, body),
            Err(err) => {
                let status = err.status();
                if status >= 500 {
                    tracing::error!(?err, "request failed");
                } else {
                    tracing::debug!(%err, "request rejected");
                }
                let HttpResponse { status, body } =
                    HttpResponse::error(status, &err.to_string());
                self.respond(status, body)
            }
        }
    }

    /// Dispatch to the correct handlers.
    fn handle_inner(&mut self, req: HttpRequest) -> HandlerResult {
        match req {
            HttpRequest::HealthGet => Ok((200, b"{}".to_vec())),
            HttpRequest::Register { body } => self.handle_register(body),
            HttpRequest::Login { body } => self.handle_login(body),
            HttpRequest::Claim {
                status,
                flight_id,
                seat,
                idempotency_key,
                auth,
            } => self.handle_claim(status, flight_id, seat, idempotency_key, auth),
            HttpRequest::Release {
                expected,
                booking_id,
                auth,
            } => self.handle_release(expected, booking_id, auth),
            HttpRequest::FlightGet { flight_id } => {
                self.handle_flight_get(flight_id)
            }
            HttpRequest::Event { body } => self.handle_event(body),
        }
    }

    fn handle_register(&mut self, body: bytes::Bytes) -> HandlerResult {
        let creds = Credentials::try_from_slice(&body)?;
        let hash = self.auth.hash_password(&creds.password);
        let user_id = self.store.create_user(&creds.email, &hash)?;

        tracing::info!(user_id, "registered user");

        json_ok(&serde_json::json!({
            "userId": user_id,
            "email": creds.email,
        }))
    }

    fn handle_login(&mut self, body: bytes::Bytes) -> HandlerResult {
        let creds = Credentials::try_from_slice(&body)
            .map_err(|_| BookingError::Unauthorized)?;
        let user_id = self.check_credentials(&creds)?;
        let (token, expires_at) = self.auth.issue_token(user_id)?;

        json_ok(&serde_json::json!({
            "token": token,
            "expiresAt": expires_at.to_string(),
        }))
    }

    /// Resolve the user a protected request acts for.
    fn authenticate(&self, input: &AuthInput) -> BookingResult<i64> {
        if let Some(authorization) = &input.authorization {
            let token = authorization
                .strip_prefix("Bearer ")
                .ok_or(BookingError::Unauthorized)?;
            return self.auth.verify_token(token.trim());
        }

        let creds = Credentials::try_from_optional_slice(&input.body)
            .map_err(|_| BookingError::Unauthorized)?
            .ok_or(BookingError::Unauthorized)?;
        self.check_credentials(&creds)
    }

    fn check_credentials(&self, creds: &Credentials) -> BookingResult<i64> {
        let user = self.store.find_user(&creds.email)?;
        let stored = user.as_ref().map(|u| u.password_hash.as_str());
        if !self.auth.verify_password(&creds.password, stored) {
            return Err(BookingError::Unauthorized);
        }
        user.map(|u| u.id).ok_or(BookingError::Unauthorized)
    }

    fn handle_claim(
        &mut self,
        status: SeatStatus,
        flight_id: u32,
        seat: Option<u32>,
        idempotency_key: Option<String>,
        auth: AuthInput,
    ) -> HandlerResult {
        let user_id = self.authenticate(&auth)?;

        let claimed = match seat {
            Some(seat_no) => {
                if seat_no == 0 || seat_no > self.config.seats_per_flight {
                    return Err(BookingError::Invalid("InvalidSeat"));
                }
                self.store.claim_seat(flight_id, seat_no, user_id, status)?
            }
            None => {
                let key = parse_idempotency_key(idempotency_key.as_deref())?;
                self.store.claim_any(flight_id, user_id, status, key.as_deref())?
            }
        };

        tracing::debug!(
            user_id,
            flight_id,
            seat = claimed.seat,
            status = ?claimed.status,
            "claimed seat"
        );

        json_ok(&SeatResponse::from(claimed))
    }

    fn handle_release(
        &mut self,
        expected: SeatStatus,
        booking_id: i64,
        auth: AuthInput,
    ) -> HandlerResult {
        let user_id = self.authenticate(&auth)?;
        let released = self.store.release(booking_id, user_id, expected)?;

        tracing::debug!(
            user_id,
            booking_id,
            from = ?expected,
            "released seat"
        );

        json_ok(&SeatResponse::from(released))
    }

    fn handle_flight_get(&mut self, flight_id: u32) -> HandlerResult {
        let state = self.store.flight_state(flight_id)?;
        let seats = self.store.flight_seats(flight_id)?;

        let count =
            |status: SeatStatus| seats.iter().filter(|s| s.status == status).count();

        let res = FlightResponse {
            flight_id,
            state,
            vacant: count(SeatStatus::Vacant),
            booked: count(SeatStatus::Booked),
            bought: count(SeatStatus::Bought),
            seats: seats
                .iter()
                .map(|s| FlightSeat {
                    booking_id: s.id,
                    seat: s.seat,
                    status: s.status,
                })
                .collect(),
        };

        json_ok(&res)
    }

    fn handle_event(&mut self, body: bytes::Bytes) -> HandlerResult {
        use subtle::ConstantTimeEq;

        let event = ParsedEvent::try_from_slice(&body)?;

        // an unset secret never matches
        let secret_ok = !self.config.event_secret.is_empty()
            && bool::from(
                event
                    .secret_key
                    .as_bytes()
                    .ct_eq(self.config.event_secret.as_bytes()),
            );
        if !secret_ok {
            return Err(BookingError::Unauthorized);
        }

        let notified = FlightEvent::from_name(&event.event, event.flight_id)?
            .apply(self.store, self.mailer)?;

        json_ok(&serde_json::json!({
            "message": "Message received",
            "notified": notified,
        }))
    }

    /// Process the response.
    fn respond(self, status: u16, body: Vec<u8>) {
        let Self { res, .. } = self;
        res(HttpResponse { status, body });
    }
}
