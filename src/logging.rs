use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};

use log::{error, info, warn};
use rocket::{
    fairing::{Fairing, Info, Kind},
    http::StatusClass,
    Data, Orbit, Request, Response, Rocket,
};

/// Per-request sequence number, shown in every request/response log line.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RequestId(pub u64);

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl RequestId {
    /// Take the next ID from the process-wide counter.
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// The ID of `req`, assigned on first use.
    pub fn of(req: &Request<'_>) -> Self {
        *req.local_cache(Self::next)
    }
}

/// Logs the launch address, every request and response, and shutdown.
#[derive(Debug, Copy, Clone)]
pub struct LoggerFairing;

#[rocket::async_trait]
impl Fairing for LoggerFairing {
    fn info(&self) -> Info {
        Info {
            name: "Logger",
            kind: Kind::Liftoff | Kind::Request | Kind::Response | Kind::Shutdown,
        }
    }

    async fn on_liftoff(&self, rocket: &Rocket<Orbit>) {
        let scheme = if rocket.config().tls_enabled() {
            "https"
        } else {
            "http"
        };
        let address = &rocket.config().address;
        let port = rocket.config().port;
        info!("Listening on {scheme}://{address}:{port}");
    }

    async fn on_request(&self, req: &mut Request<'_>, _data: &mut Data<'_>) {
        let id = RequestId::of(req);
        info!("{id} -> {} {}", req.method(), req.uri());
    }

    async fn on_response<'r>(&self, req: &'r Request<'_>, res: &mut Response<'r>) {
        let id = RequestId::of(req);
        let status = res.status();
        let route = req.route().map_or_else(
            || "no route".to_string(),
            |route| match &route.name {
                Some(name) => format!("{name} ({})", route.uri),
                None => route.uri.to_string(),
            },
        );
        match status.class() {
            StatusClass::ServerError => error!("{id} <- {status} {route}"),
            StatusClass::ClientError => warn!("{id} <- {status} {route}"),
            _ => info!("{id} <- {status} {route}"),
        }
    }

    async fn on_shutdown(&self, _rocket: &Rocket<Orbit>) {
        warn!("Shutting down");
    }
}
