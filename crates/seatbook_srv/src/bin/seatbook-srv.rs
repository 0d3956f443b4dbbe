//! The binary seatbook-srv.

use seatbook_srv::*;

#[derive(clap::Parser, Debug)]
#[command(version, args_conflicts_with_subcommands = true)]
pub struct Args {
    /// The command to run, defaults to `serve`.
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub serve: ServeArgs,
}

/// Seatbook commands.
#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Run the server until ctrl-c.
    Serve(ServeArgs),

    /// Create the vacant seats of a flight.
    FillFlight {
        /// The flight number.
        flight: u32,

        /// How many seats to create, defaults to the configured
        /// seats per flight.
        #[arg(long)]
        seats: Option<u32>,

        /// Path to the SQLite database file.
        #[arg(long)]
        database: std::path::PathBuf,
    },
}

/// Options of the `serve` command.
#[derive(clap::Args, Debug)]
pub struct ServeArgs {
    /// By default seatbook-srv runs in "testing" configuration
    /// with much lighter resource usage settings and a throwaway
    /// database. This testing mode should be more than enough for
    /// developer application testing and automated tests.
    ///
    /// To setup the server to be ready to use most of the resources available
    /// on a single given machine, you can set this "production" mode.
    #[arg(long)]
    pub production: bool,

    /// Address to listen on, may be given multiple times.
    #[arg(long)]
    pub listen: Vec<std::net::SocketAddr>,

    /// Path to the SQLite database file.
    #[arg(long)]
    pub database: Option<std::path::PathBuf>,

    /// Path to a PEM TLS certificate, requires `--tls-key`.
    #[arg(long, requires = "tls_key")]
    pub tls_cert: Option<std::path::PathBuf>,

    /// Path to a PEM TLS private key, requires `--tls-cert`.
    #[arg(long, requires = "tls_cert")]
    pub tls_key: Option<std::path::PathBuf>,

    /// Spool outgoing mail into this directory instead of only logging it.
    #[arg(long)]
    pub mail_spool_dir: Option<std::path::PathBuf>,

    /// Secret the flight operations system sends with flight events.
    #[arg(long, env = "SEATBOOK_EVENT_SECRET", hide_env_values = true)]
    pub event_secret: Option<String>,

    /// Key for signing login tokens.
    #[arg(long, env = "SEATBOOK_TOKEN_SECRET", hide_env_values = true)]
    pub token_secret: Option<String>,
}

impl ServeArgs {
    fn config(self) -> Config {
        let mut config = if self.production {
            Config::production()
        } else {
            Config::testing()
        };

        if !self.listen.is_empty() {
            config.listen_address_list = self.listen;
        }
        if self.database.is_some() {
            config.database_path = self.database;
        }
        config.tls_cert = self.tls_cert;
        config.tls_key = self.tls_key;
        if self.mail_spool_dir.is_some() {
            config.mail_spool_dir = self.mail_spool_dir;
        }
        if let Some(event_secret) = self.event_secret {
            config.event_secret = event_secret;
        }
        if let Some(token_secret) = self.token_secret {
            config.token_secret = token_secret.into_bytes();
        }

        config
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing::Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let args = <Args as clap::Parser>::parse();

    let result = match args.command {
        None => serve(args.serve),
        Some(Command::Serve(serve_args)) => serve(serve_args),
        Some(Command::FillFlight {
            flight,
            seats,
            database,
        }) => fill_flight(flight, seats, database),
    };

    if let Err(err) = result {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn serve(args: ServeArgs) -> std::io::Result<()> {
    let config = args.config();

    println!("{config:?}");

    let (send, recv) = std::sync::mpsc::channel();

    ctrlc::set_handler(move || {
        let _ = send.send(());
    })
    .map_err(std::io::Error::other)?;

    let srv = SeatbookSrv::new(config)?;
    srv.print_addrs();

    let _ = recv.recv();

    println!("Terminating...");
    drop(srv);
    println!("Done.");
    Ok(())
}

fn fill_flight(
    flight: u32,
    seats: Option<u32>,
    database: std::path::PathBuf,
) -> std::io::Result<()> {
    let seats = seats.unwrap_or(Config::testing().seats_per_flight);

    let mut store = Store::open(&database).map_err(std::io::Error::other)?;
    store.migrate().map_err(std::io::Error::other)?;
    let created = store
        .fill_flight(flight, seats)
        .map_err(std::io::Error::other)?;

    println!("flight {flight}: created {created} of {seats} seats");
    Ok(())
}
