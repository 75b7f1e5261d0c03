use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use futures::future::{abortable, AbortHandle, Aborted};
use futures::StreamExt;
use smol::net::{TcpListener as SmolTcpListener, TcpStream};
use tracing::{instrument, warn};

use crate::{conn::Conn, events::Hooks, fsm::ServerFsm};

/// Accepts TCP connections and drives each one through a [`ServerFsm`].
///
/// `Listener` is the component that actually owns sockets: it binds the
/// listening socket, and it owns the set of currently-live connections so
/// that [`Listener::stop`] can close all of them. Each accepted connection
/// runs in its own spawned task, so no two callbacks for the same `Conn`
/// ever run concurrently.
pub struct Listener {
    host: Option<String>,
    port: u16,
    hostname: String,
    debug: bool,
    timeout: Option<Duration>,
    hooks: Hooks<TcpStream>,
    live: Arc<Mutex<HashMap<u64, AbortHandle>>>,
    accept_abort: Option<AbortHandle>,
}

impl Listener {
    pub fn new(host: Option<String>, port: u16, hostname: impl Into<String>, debug: bool) -> Listener {
        Listener {
            host,
            port,
            hostname: hostname.into(),
            debug,
            timeout: None,
            hooks: Hooks::new(),
            live: Arc::new(Mutex::new(HashMap::new())),
            accept_abort: None,
        }
    }

    /// Per-connection inactivity timeout. Must be set before
    /// [`Listener::start`]; it has no effect on already-running sessions.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    /// Register `client`/`disconnect`/`mail`/acceptance-policy handlers.
    /// Must be called before [`Listener::start`] — hooks registered after
    /// start has bound the listening socket have no effect, since `start`
    /// moves the table into the `Arc` every accepted connection shares.
    pub fn hooks(&mut self) -> &mut Hooks<TcpStream> {
        &mut self.hooks
    }

    pub fn live_connection_count(&self) -> usize {
        self.live.lock().unwrap().len()
    }

    /// Bind the listening socket and start accepting connections. Returns
    /// the address actually bound to, which matters when `port` was `0`
    /// (used by tests that want the OS to pick a free port).
    #[instrument(skip(self), fields(host = ?self.host, port = self.port))]
    pub async fn start(&mut self) -> std::io::Result<SocketAddr> {
        let bind_addr = format!("{}:{}", self.host.as_deref().unwrap_or("0.0.0.0"), self.port);
        let tcp_listener = SmolTcpListener::bind(bind_addr.as_str()).await?;
        let local_addr = tcp_listener.local_addr()?;

        let hooks = Arc::new(std::mem::take(&mut self.hooks));
        let hostname = self.hostname.clone();
        let debug = self.debug;
        let timeout = self.timeout;
        let live = self.live.clone();
        let next_id = Arc::new(AtomicU64::new(0));

        let accept_loop = async move {
            let mut incoming = tcp_listener.incoming();
            while let Some(stream) = incoming.next().await {
                let stream = match stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        warn!(error = %e, "accepting a connection failed");
                        continue;
                    }
                };
                spawn_connection(stream, hostname.clone(), debug, timeout, hooks.clone(), &live, &next_id);
            }
        };
        let (accept_loop, accept_abort) = abortable(accept_loop);
        smol::spawn(accept_loop).detach();
        self.accept_abort = Some(accept_abort);

        Ok(local_addr)
    }

    /// Close every live connection (each fires its own `disconnect`) and
    /// stop accepting new ones. `start` may be called again afterwards.
    pub async fn stop(&mut self) {
        if let Some(abort) = self.accept_abort.take() {
            abort.abort();
        }
        let handles: Vec<AbortHandle> = self.live.lock().unwrap().drain().map(|(_, h)| h).collect();
        for handle in handles {
            handle.abort();
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn spawn_connection(
    stream: TcpStream,
    hostname: String,
    debug: bool,
    timeout: Option<Duration>,
    hooks: Arc<Hooks<TcpStream>>,
    live: &Arc<Mutex<HashMap<u64, AbortHandle>>>,
    next_id: &Arc<AtomicU64>,
) {
    let id = next_id.fetch_add(1, Ordering::Relaxed);
    let wrapper_hooks = hooks.clone();
    let live_for_id = live.clone();
    let (conn_fut, abort) = abortable(handle_connection(
        id,
        stream,
        hostname,
        debug,
        timeout,
        hooks,
        live.clone(),
    ));
    live.lock().unwrap().insert(id, abort);
    smol::spawn(async move {
        if let Err(Aborted) = conn_fut.await {
            // Listener::stop already removed `id` from the live set
            // before calling abort(), so there is nothing left to clean
            // up here beyond the one disconnect notification.
            wrapper_hooks.fire_disconnect("stopped");
        }
        let _ = live_for_id; // keep the clone alive for symmetry with the non-aborted path
    })
    .detach();
}

async fn handle_connection(
    id: u64,
    stream: TcpStream,
    hostname: String,
    debug: bool,
    timeout: Option<Duration>,
    hooks: Arc<Hooks<TcpStream>>,
    live: Arc<Mutex<HashMap<u64, AbortHandle>>>,
) {
    let mut conn = Conn::new(stream, timeout);
    let mut fsm = ServerFsm::new(hostname, debug);

    if let Err(e) = fsm.greet(&mut conn, &hooks).await {
        live.lock().unwrap().remove(&id);
        hooks.fire_disconnect(&e.to_string());
        return;
    }

    let reason = loop {
        match conn.read_command().await {
            Ok(Some(line)) => {
                if let Err(e) = fsm.handle_line(&mut conn, &hooks, &line).await {
                    break e.to_string();
                }
                if fsm.is_closed() {
                    break "quit".to_owned();
                }
            }
            Ok(None) => break "peer closed the connection".to_owned(),
            Err(e) => break e.to_string(),
        }
    };

    let _ = conn.close().await;
    live.lock().unwrap().remove(&id);
    hooks.fire_disconnect(&reason);
}
