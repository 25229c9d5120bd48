//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling. Every response, success
//! or error, carries this host's `IMP-API-Location` header so peers can learn
//! our canonical location passively.

use hyper::body::Incoming;
use hyper::header::{HeaderName, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::auth::AuthService;
use crate::config::Args;
use crate::guest::{CallbackRunner, GuestConfig, GuestService, HttpPeerClient, PeerClient};
use crate::hosts::{HostDirectory, HostDiscovery, HttpProbe, Probe, IMP_LOCATION_HEADER};
use crate::limits::{LimitsConfig, RateLimiter};
use crate::notes::NoteService;
use crate::routes::{self, BoxBody};
use crate::store::Store;
use crate::types::ImpError;

/// Shared application state, built once at startup
pub struct AppState {
    pub args: Args,
    pub store: Arc<dyn Store>,
    pub limiter: Arc<RateLimiter>,
    pub directory: Arc<HostDirectory>,
    pub guests: GuestService,
    pub auth: AuthService,
    pub notes: NoteService,
    /// Precomputed `IMP-API-Location` value
    pub location_header: HeaderValue,
    pub started_at: Instant,
}

impl AppState {
    /// State talking to real peers over HTTPS
    pub fn new(args: Args, store: Arc<dyn Store>) -> Result<Self, ImpError> {
        let timeout = args.callback_timeout();
        Self::with_peers(
            args,
            store,
            Arc::new(HttpProbe::new(timeout)),
            Arc::new(HttpPeerClient::new(timeout)),
        )
    }

    /// State with explicit discovery and callback transports
    pub fn with_peers(
        args: Args,
        store: Arc<dyn Store>,
        probe: Arc<dyn Probe>,
        peer: Arc<dyn PeerClient>,
    ) -> Result<Self, ImpError> {
        let location_header = HeaderValue::from_str(&args.api_location_header())
            .map_err(|e| ImpError::Config(format!("Invalid API_HOST: {}", e)))?;

        let limiter = Arc::new(RateLimiter::new(
            Arc::clone(&store),
            LimitsConfig::from(&args),
        ));

        let directory = Arc::new(HostDirectory::new(
            Arc::clone(&store),
            HostDiscovery::new(probe, args.default_port, args.discovery_max_hops),
        ));

        let guests = GuestService::new(
            Arc::clone(&store),
            Arc::clone(&directory),
            peer,
            CallbackRunner::new(args.callback_workers, args.callback_timeout()),
            GuestConfig {
                api_host: args.api_host(),
                pending_window: args.pending_window(),
            },
        );

        let auth = AuthService::new(Arc::clone(&store), Arc::clone(&limiter))?;
        let notes = NoteService::new(Arc::clone(&store));

        Ok(Self {
            args,
            store,
            limiter,
            directory,
            guests,
            auth,
            notes,
            location_header,
            started_at: Instant::now(),
        })
    }
}

/// Bind the configured address and serve forever
pub async fn run(state: Arc<AppState>) -> Result<(), ImpError> {
    let listener = TcpListener::bind(state.args.listen).await?;
    serve(listener, state).await
}

/// Serve connections from an already bound listener
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<(), ImpError> {
    info!(
        "imp listening on {} as {} (store: {})",
        listener.local_addr()?,
        state.args.api_host(),
        state.store.kind()
    );

    if state.args.dev_mode {
        warn!("Development mode enabled");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .preserve_header_case(true)
                        .title_case_headers(true)
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    info!("[{}] {} {}", addr, method, path);

    let segments: Vec<String> = path
        .trim_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| {
            urlencoding::decode(s)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| s.to_string())
        })
        .collect();
    let segments: Vec<&str> = segments.iter().map(String::as_str).collect();

    let mut response = match (&method, segments.as_slice()) {
        (&Method::OPTIONS, _) => routes::preflight_response(),

        // Discovery probes the bare host
        (&Method::GET, []) | (&Method::HEAD, []) => routes::home(Arc::clone(&state)),

        (&Method::GET, ["health"]) | (&Method::GET, ["healthz"]) => {
            routes::health_check(Arc::clone(&state))
        }

        // Accounts and sessions
        (&Method::POST, ["user"]) => routes::handle_register(req, Arc::clone(&state), addr).await,
        (&Method::POST, ["token"]) => routes::handle_login(req, Arc::clone(&state), addr).await,
        (&Method::DELETE, ["token", token]) => {
            routes::handle_logout(Arc::clone(&state), token).await
        }

        // Notes
        (&Method::GET, ["note"]) => routes::handle_list_notes(req, Arc::clone(&state)).await,
        (&Method::POST, ["note"]) => routes::handle_post_note(req, Arc::clone(&state)).await,
        (&Method::GET, ["note", id]) => routes::handle_get_note(req, Arc::clone(&state), id).await,
        (&Method::PUT, ["note", id]) => routes::handle_put_note(req, Arc::clone(&state), id).await,
        (&Method::DELETE, ["note", id]) => {
            routes::handle_delete_note(req, Arc::clone(&state), id).await
        }

        // Guest handshake
        (&Method::GET, ["user", handle, "host", host]) => {
            routes::handle_get_user_host(req, Arc::clone(&state), handle, host).await
        }
        (&Method::POST, ["user", handle, "host"]) => {
            routes::handle_post_user_host(req, Arc::clone(&state), handle).await
        }
        (&Method::POST, ["guest"]) => routes::handle_post_guest(req, Arc::clone(&state)).await,

        _ => routes::not_found(&path),
    };

    response
        .headers_mut()
        .insert(
            HeaderName::from_static(IMP_LOCATION_HEADER),
            state.location_header.clone(),
        );
    Ok(response)
}
