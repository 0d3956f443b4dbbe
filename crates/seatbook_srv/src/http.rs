use crate::{BookingError, Config, SeatStatus, TlsConfig};
use axum::*;
use axum_server::tls_rustls::RustlsAcceptor;
use std::sync::Arc;

/// Request bodies larger than this are rejected.
const MAX_BODY_BYTES: usize = 1024;

/// How long a request may wait on the worker pool for a response.
const DISPATCH_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn error(status: u16, error: &str) -> Self {
        Self {
            status,
            body: serde_json::json!({ "error": error }).to_string().into_bytes(),
        }
    }

    fn respond(self) -> response::Response {
        response::Response::builder()
            .status(self.status)
            .header("Content-Type", "application/json")
            .body(body::Body::from(self.body))
            .unwrap_or_else(|_| {
                response::IntoResponse::into_response(
                    http::StatusCode::INTERNAL_SERVER_ERROR,
                )
            })
    }
}

pub type HttpRespondCb = Box<dyn FnOnce(HttpResponse) + 'static + Send>;

/// What a protected request brings along to authenticate with.
pub struct AuthInput {
    /// The raw `Authorization` header, if any.
    pub authorization: Option<String>,

    /// The request body, which may carry credentials.
    pub body: bytes::Bytes,
}

pub enum HttpRequest {
    HealthGet,
    Register {
        body: bytes::Bytes,
    },
    Login {
        body: bytes::Bytes,
    },
    Claim {
        status: SeatStatus,
        flight_id: u32,
        seat: Option<u32>,
        idempotency_key: Option<String>,
        auth: AuthInput,
    },
    Release {
        expected: SeatStatus,
        booking_id: i64,
        auth: AuthInput,
    },
    FlightGet {
        flight_id: u32,
    },
    Event {
        body: bytes::Bytes,
    },
}

type HSend = async_channel::Sender<(HttpRequest, HttpRespondCb)>;
type HRecv = async_channel::Receiver<(HttpRequest, HttpRespondCb)>;

#[derive(Clone)]
pub struct HttpReceiver(HRecv);

impl HttpReceiver {
    pub fn recv(&self) -> Option<(HttpRequest, HttpRespondCb)> {
        match self.0.recv_blocking() {
            Ok(r) => Some(r),
            Err(_) => None,
        }
    }
}

pub struct ServerConfig {
    pub addrs: Vec<std::net::SocketAddr>,
    pub worker_thread_count: usize,
    pub tls_config: Option<TlsConfig>,
}

pub struct Server {
    t_join: Option<std::thread::JoinHandle<()>>,
    addrs: Vec<std::net::SocketAddr>,
    receiver: HttpReceiver,
    h_send: HSend,
    shutdown: Option<axum_server::Handle>,
}

impl Drop for Server {
    fn drop(&mut self) {
        self.h_send.close();
        if let Some(shutdown) = self.shutdown.take() {
            shutdown.shutdown();
        }
        if let Some(t_join) = self.t_join.take() {
            let _ = t_join.join();
        }
    }
}

impl Server {
    pub fn new(
        config: Arc<Config>,
        server_config: ServerConfig,
    ) -> std::io::Result<Self> {
        let (s_ready, r_ready) = tokio::sync::oneshot::channel();
        let t_join = std::thread::spawn(move || {
            tokio_thread(config, server_config, s_ready)
        });
        match r_ready.blocking_recv() {
            Ok(Ok(Ready {
                h_send,
                addrs,
                receiver,
                shutdown,
            })) => Ok(Self {
                t_join: Some(t_join),
                addrs,
                receiver,
                h_send,
                shutdown: Some(shutdown),
            }),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(std::io::Error::other("failed to bind server")),
        }
    }

    pub fn server_addrs(&self) -> &[std::net::SocketAddr] {
        self.addrs.as_slice()
    }

    pub fn receiver(&self) -> &HttpReceiver {
        &self.receiver
    }
}

struct Ready {
    h_send: HSend,
    addrs: Vec<std::net::SocketAddr>,
    receiver: HttpReceiver,
    shutdown: axum_server::Handle,
}

#[derive(Clone)]
struct AppState {
    h_send: HSend,
}

/// A request body, or why it could not be read.
type Body = Result<bytes::Bytes, extract::rejection::BytesRejection>;

type BoxFut<'a, T> =
    std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

fn router() -> Router<AppState> {
    Router::<AppState>::new()
        .route("/health", routing::get(handle_health_get))
        .route("/register", routing::post(handle_register))
        .route("/api/login_check", routing::post(handle_login))
        .route("/api/booking/:flight", routing::post(handle_book_any))
        .route("/api/booking/:flight/:seat", routing::post(handle_book_seat))
        .route("/api/buy_ticket/:flight", routing::post(handle_buy_any))
        .route("/api/buy_ticket/:flight/:seat", routing::post(handle_buy_seat))
        .route("/api/cancel_booking/:id", routing::post(handle_cancel_booking))
        .route("/api/cancel_ticket/:id", routing::post(handle_cancel_ticket))
        .route("/api/flight/:flight", routing::get(handle_flight_get))
        .route("/api/event", routing::post(handle_event))
        .fallback(handle_not_found)
}

fn tokio_thread(
    config: Arc<Config>,
    server_config: ServerConfig,
    ready: tokio::sync::oneshot::Sender<std::io::Result<Ready>>,
) {
    tracing::trace!(?config, "Starting tokio thread");

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            let _ = ready.send(Err(err));
            return;
        }
    };

    runtime.block_on(async move {
        let (h_send, h_recv) =
            async_channel::bounded(server_config.worker_thread_count);

        let app: Router = router()
            .layer(extract::DefaultBodyLimit::max(MAX_BODY_BYTES))
            .with_state(AppState {
                h_send: h_send.clone(),
            });

        let receiver = HttpReceiver(h_recv);

        let mut addrs = Vec::with_capacity(server_config.addrs.len());
        let mut servers: Vec<BoxFut<'static, std::io::Result<()>>> =
            Vec::with_capacity(server_config.addrs.len());

        let shutdown_handle = axum_server::Handle::new();

        let rustls_config = match &server_config.tls_config {
            None => None,
            Some(tls_config) => match tls_config.load().await {
                Ok(rustls_config) => Some(rustls_config),
                Err(err) => {
                    let _ = ready.send(Err(err));
                    return;
                }
            },
        };

        for addr in server_config.addrs {
            tracing::info!("Binding to: {}", addr);

            let listener = match tokio::task::spawn_blocking(move || {
                std::net::TcpListener::bind(addr)
            })
            .await
            {
                Ok(Ok(listener)) => listener,
                Ok(Err(err)) => {
                    let _ = ready.send(Err(err));
                    return;
                }
                Err(err) => {
                    let _ = ready.send(Err(std::io::Error::other(err)));
                    return;
                }
            };

            match listener.local_addr() {
                Ok(addr) => {
                    tracing::info!("Bound with local address: {}", addr);
                    addrs.push(addr)
                }
                Err(err) => {
                    let _ = ready.send(Err(err));
                    return;
                }
            }

            let app = app.clone();
            let shutdown_handle = shutdown_handle.clone();
            if let Some(rustls_config) = &rustls_config {
                let s = axum_server::Server::from_tcp(listener)
                    .acceptor(RustlsAcceptor::new(rustls_config.clone()))
                    .handle(shutdown_handle)
                    .serve(app.into_make_service());
                servers.push(Box::pin(s));
            } else {
                let s = axum_server::Server::from_tcp(listener)
                    .handle(shutdown_handle)
                    .serve(app.into_make_service());
                servers.push(Box::pin(s));
            }
        }

        tracing::info!("Sending ready signal");

        if ready
            .send(Ok(Ready {
                h_send,
                addrs,
                receiver,
                shutdown: shutdown_handle,
            }))
            .is_err()
        {
            return;
        }

        for result in futures::future::join_all(servers).await {
            if let Err(err) = result {
                tracing::error!(?err, "http server exited with error");
            }
        }
    });
}

async fn handle_dispatch(
    h_send: &HSend,
    req: HttpRequest,
) -> response::Response {
    let (s, r) = tokio::sync::oneshot::channel();
    let s = Box::new(move |res| {
        let _ = s.send(res);
    });
    tokio::time::timeout(DISPATCH_TIMEOUT, async move {
        let _ = h_send.send((req, s)).await;
        match r.await {
            Ok(r) => r.respond(),
            Err(_) => HttpResponse::error(500, "request dropped").respond(),
        }
    })
    .await
    .unwrap_or_else(|_| HttpResponse::error(500, "internal timeout").respond())
}

fn auth_input(headers: &http::HeaderMap, body: bytes::Bytes) -> AuthInput {
    AuthInput {
        authorization: headers
            .get(http::header::AUTHORIZATION)
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned()),
        body,
    }
}

fn idempotency_key(headers: &http::HeaderMap) -> Option<String> {
    headers
        .get("idempotency-key")
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
}

async fn handle_health_get(
    extract::State(state): extract::State<AppState>,
) -> response::Response {
    handle_dispatch(&state.h_send, HttpRequest::HealthGet).await
}

async fn handle_not_found() -> response::Response {
    HttpResponse::error(404, "NotFound").respond()
}

async fn handle_register(
    extract::State(state): extract::State<AppState>,
    body: Body,
) -> response::Response {
    let body = match read_body(body) {
        Ok(body) => body,
        Err(err) => return err,
    };
    handle_dispatch(&state.h_send, HttpRequest::Register { body }).await
}

async fn handle_login(
    extract::State(state): extract::State<AppState>,
    body: Body,
) -> response::Response {
    let body = match read_body(body) {
        Ok(body) => body,
        Err(err) => return err,
    };
    handle_dispatch(&state.h_send, HttpRequest::Login { body }).await
}

async fn handle_claim(
    state: AppState,
    status: SeatStatus,
    flight: String,
    seat: Option<String>,
    headers: http::HeaderMap,
    body: Body,
) -> response::Response {
    let flight_id = match parse_positive::<u32>(&flight) {
        Ok(flight_id) => flight_id,
        Err(err) => return err,
    };
    // the seat range is checked against the config by the worker
    let seat = match seat.as_deref().map(parse_segment::<u32>).transpose() {
        Ok(seat) => seat,
        Err(err) => return err,
    };
    let body = match read_body(body) {
        Ok(body) => body,
        Err(err) => return err,
    };
    handle_dispatch(
        &state.h_send,
        HttpRequest::Claim {
            status,
            flight_id,
            seat,
            idempotency_key: idempotency_key(&headers),
            auth: auth_input(&headers, body),
        },
    )
    .await
}

async fn handle_book_any(
    extract::Path(flight): extract::Path<String>,
    extract::State(state): extract::State<AppState>,
    headers: http::HeaderMap,
    body: Body,
) -> response::Response {
    handle_claim(state, SeatStatus::Booked, flight, None, headers, body).await
}

async fn handle_book_seat(
    extract::Path((flight, seat)): extract::Path<(String, String)>,
    extract::State(state): extract::State<AppState>,
    headers: http::HeaderMap,
    body: Body,
) -> response::Response {
    handle_claim(state, SeatStatus::Booked, flight, Some(seat), headers, body)
        .await
}

async fn handle_buy_any(
    extract::Path(flight): extract::Path<String>,
    extract::State(state): extract::State<AppState>,
    headers: http::HeaderMap,
    body: Body,
) -> response::Response {
    handle_claim(state, SeatStatus::Bought, flight, None, headers, body).await
}

async fn handle_buy_seat(
    extract::Path((flight, seat)): extract::Path<(String, String)>,
    extract::State(state): extract::State<AppState>,
    headers: http::HeaderMap,
    body: Body,
) -> response::Response {
    handle_claim(state, SeatStatus::Bought, flight, Some(seat), headers, body)
        .await
}

async fn handle_release(
    state: AppState,
    expected: SeatStatus,
    id: String,
    headers: http::HeaderMap,
    body: Body,
) -> response::Response {
    let booking_id = match parse_positive::<i64>(&id) {
        Ok(booking_id) => booking_id,
        Err(err) => return err,
    };
    let body = match read_body(body) {
        Ok(body) => body,
        Err(err) => return err,
    };
    handle_dispatch(
        &state.h_send,
        HttpRequest::Release {
            expected,
            booking_id,
            auth: auth_input(&headers, body),
        },
    )
    .await
}

async fn handle_cancel_booking(
    extract::Path(id): extract::Path<String>,
    extract::State(state): extract::State<AppState>,
    headers: http::HeaderMap,
    body: Body,
) -> response::Response {
    handle_release(state, SeatStatus::Booked, id, headers, body).await
}

async fn handle_cancel_ticket(
    extract::Path(id): extract::Path<String>,
    extract::State(state): extract::State<AppState>,
    headers: http::HeaderMap,
    body: Body,
) -> response::Response {
    handle_release(state, SeatStatus::Bought, id, headers, body).await
}

async fn handle_flight_get(
    extract::Path(flight): extract::Path<String>,
    extract::State(state): extract::State<AppState>,
) -> response::Response {
    let flight_id = match parse_positive::<u32>(&flight) {
        Ok(flight_id) => flight_id,
        Err(err) => return err,
    };
    handle_dispatch(&state.h_send, HttpRequest::FlightGet { flight_id }).await
}

async fn handle_event(
    extract::State(state): extract::State<AppState>,
    body: Body,
) -> response::Response {
    let body = match read_body(body) {
        Ok(body) => body,
        Err(err) => return err,
    };
    handle_dispatch(&state.h_send, HttpRequest::Event { body }).await
}

fn reject(err: BookingError) -> response::Response {
    HttpResponse::error(err.status(), &err.to_string()).respond()
}

/// Unwrap the request body, answering json errors for oversized or
/// unreadable bodies.
fn read_body(body: Body) -> Result<bytes::Bytes, response::Response> {
    body.map_err(|rejection| {
        let status = rejection.status();
        let err = if status == http::StatusCode::PAYLOAD_TOO_LARGE {
            BookingError::MalformedPayload("body too large".to_string())
        } else {
            BookingError::MalformedPayload(rejection.body_text())
        };
        HttpResponse::error(status.as_u16(), &err.to_string()).respond()
    })
}

/// Parse an integer path segment.
fn parse_segment<T>(s: &str) -> Result<T, response::Response>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    s.parse::<T>().map_err(|err| {
        reject(BookingError::InvalidPathSegment(format!("{s}: {err}")))
    })
}

/// Parse a positive integer path segment.
fn parse_positive<T>(s: &str) -> Result<T, response::Response>
where
    T: std::str::FromStr + PartialOrd + From<u8>,
    T::Err: std::fmt::Display,
{
    let v = parse_segment::<T>(s)?;
    if v < T::from(1) {
        return Err(reject(BookingError::InvalidPathSegment(format!(
            "{s} must be positive"
        ))));
    }
    Ok(v)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn segment_parsing() {
        assert_eq!(12_u32, parse_positive::<u32>("12").unwrap());
        assert_eq!(12_i64, parse_positive::<i64>("12").unwrap());
        assert!(parse_positive::<u32>("0").is_err());
        assert!(parse_positive::<i64>("-3").is_err());
        assert!(parse_positive::<u32>("abc").is_err());
        assert!(parse_positive::<u32>("").is_err());

        // seat numbers are range checked later
        assert_eq!(0_u32, parse_segment::<u32>("0").unwrap());
        assert!(parse_segment::<u32>("-1").is_err());
    }

    #[test]
    fn segment_rejection_is_invalid_path_segment() {
        let res = match parse_positive::<u32>("0") {
            Err(res) => res,
            Ok(_) => panic!("zero accepted"),
        };
        assert_eq!(http::StatusCode::BAD_REQUEST, res.status());
    }

    #[test]
    fn error_body_is_json() {
        let r = HttpResponse::error(409, "NoVacantSeat");
        assert_eq!(409, r.status);
        assert_eq!(br#"{"error":"NoVacantSeat"}"#.to_vec(), r.body);
    }
}
