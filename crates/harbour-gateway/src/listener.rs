//! Connection-tracking listener for zero-downtime restarts
//!
//! A [`TrackingListener`] wraps the bound socket and counts every accepted
//! connection until it is dropped. The lifecycle has one transition:
//!
//! ```text
//! Accepting ──stop_accepting()──▶ Draining
//! ```
//!
//! Once draining, the accept socket is closed so a successor process holding
//! the same inherited descriptor picks up new connections, while connections
//! already accepted here run to completion. [`ListenerHandle::drain`] returns
//! when the last of them is gone.

use axum::serve::Listener;
use pin_project_lite::pin_project;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Notify};
use tracing::{debug, error, info};

/// Errors resolving or binding the listen address
#[derive(Error, Debug)]
pub enum ListenError {
    #[error("unsupported listener protocol: {0}")]
    UnsupportedScheme(String),

    #[error("invalid listen address: {0}")]
    InvalidAddress(String),

    #[error("invalid file descriptor: {0}")]
    InvalidFd(String),

    #[error("inherited descriptors are only supported on unix")]
    FdUnsupported,

    #[error("can't listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
}

/// Address family restriction for `tcp4://` and `tcp6://`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IpFamily {
    Any,
    V4,
    V6,
}

impl IpFamily {
    fn matches(self, addr: &SocketAddr) -> bool {
        match self {
            Self::Any => true,
            Self::V4 => addr.is_ipv4(),
            Self::V6 => addr.is_ipv6(),
        }
    }

    fn unspecified(self) -> &'static str {
        match self {
            Self::Any | Self::V4 => "0.0.0.0",
            Self::V6 => "[::]",
        }
    }
}

/// Where to listen
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ListenAddr {
    /// Bind a fresh socket on `host:port`
    Tcp { addr: String, family: IpFamily },
    /// Adopt a listening socket inherited from the parent process
    Fd(i32),
}

impl FromStr for ListenAddr {
    type Err = ListenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scheme, rest) = s.split_once("://").unwrap_or(("tcp", s));
        let rest = rest.trim_end_matches('/');

        let family = match scheme {
            "tcp" => IpFamily::Any,
            "tcp4" => IpFamily::V4,
            "tcp6" => IpFamily::V6,
            "fd" => {
                return rest
                    .parse::<i32>()
                    .ok()
                    .filter(|fd| *fd >= 0)
                    .map(ListenAddr::Fd)
                    .ok_or_else(|| ListenError::InvalidFd(rest.to_string()));
            }
            other => return Err(ListenError::UnsupportedScheme(other.to_string())),
        };

        match rest.rsplit_once(':') {
            Some((_, port)) if port.parse::<u16>().is_ok() => Ok(ListenAddr::Tcp {
                addr: rest.to_string(),
                family,
            }),
            _ => Err(ListenError::InvalidAddress(s.to_string())),
        }
    }
}

impl fmt::Display for ListenAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { addr, family: IpFamily::Any } => write!(f, "tcp://{}", addr),
            Self::Tcp { addr, family: IpFamily::V4 } => write!(f, "tcp4://{}", addr),
            Self::Tcp { addr, family: IpFamily::V6 } => write!(f, "tcp6://{}", addr),
            Self::Fd(fd) => write!(f, "fd://{}", fd),
        }
    }
}

/// Bind (or adopt) a socket and wrap it in a [`TrackingListener`]
pub async fn listen(addr: &ListenAddr) -> Result<TrackingListener, ListenError> {
    let listener = match addr {
        ListenAddr::Tcp { addr, family } => bind_tcp(addr, *family).await?,
        ListenAddr::Fd(fd) => from_fd(*fd)?,
    };

    TrackingListener::new(listener).map_err(|source| ListenError::Bind {
        addr: addr.to_string(),
        source,
    })
}

async fn bind_tcp(addr: &str, family: IpFamily) -> Result<TcpListener, ListenError> {
    let bind_error = |source: io::Error| ListenError::Bind {
        addr: addr.to_string(),
        source,
    };

    // `:8080` means every interface
    let target = match addr.strip_prefix(':') {
        Some(port) => format!("{}:{}", family.unspecified(), port),
        None => addr.to_string(),
    };

    let candidates: Vec<SocketAddr> = tokio::net::lookup_host(&target)
        .await
        .map_err(bind_error)?
        .filter(|candidate| family.matches(candidate))
        .collect();

    let mut last_error = io::Error::new(
        io::ErrorKind::AddrNotAvailable,
        "no address of the requested family",
    );
    for candidate in candidates {
        match TcpListener::bind(candidate).await {
            Ok(listener) => return Ok(listener),
            Err(e) => last_error = e,
        }
    }

    Err(bind_error(last_error))
}

#[cfg(unix)]
fn from_fd(fd: i32) -> Result<TcpListener, ListenError> {
    use std::os::unix::io::FromRawFd;

    let bind_error = |source: io::Error| ListenError::Bind {
        addr: format!("fd://{}", fd),
        source,
    };

    // SAFETY: the descriptor was passed to this process to own and is not
    // referenced anywhere else in it.
    let listener = unsafe { std::net::TcpListener::from_raw_fd(fd) };
    listener.set_nonblocking(true).map_err(bind_error)?;
    TcpListener::from_std(listener).map_err(bind_error)
}

#[cfg(not(unix))]
fn from_fd(_fd: i32) -> Result<TcpListener, ListenError> {
    Err(ListenError::FdUnsupported)
}

/// Listener lifecycle state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    Accepting,
    Draining,
}

#[derive(Debug)]
struct Tracker {
    live: AtomicUsize,
    idle: Notify,
    state: watch::Sender<LifecycleState>,
    base_url: String,
}

impl Tracker {
    fn is_draining(&self) -> bool {
        *self.state.borrow() == LifecycleState::Draining
    }
}

/// Listener that counts live connections and can stop accepting on demand
#[derive(Debug)]
pub struct TrackingListener {
    inner: Option<TcpListener>,
    local_addr: SocketAddr,
    tracker: Arc<Tracker>,
    state: watch::Receiver<LifecycleState>,
}

impl TrackingListener {
    /// Wrap an already bound listener
    pub fn new(listener: TcpListener) -> io::Result<Self> {
        let local_addr = listener.local_addr()?;
        let (state_tx, state_rx) = watch::channel(LifecycleState::Accepting);

        Ok(Self {
            inner: Some(listener),
            local_addr,
            tracker: Arc::new(Tracker {
                live: AtomicUsize::new(0),
                idle: Notify::new(),
                state: state_tx,
                base_url: format!("http://{}", local_addr),
            }),
            state: state_rx,
        })
    }

    /// Control handle; stays usable after the listener moves into the server
    pub fn handle(&self) -> ListenerHandle {
        ListenerHandle {
            tracker: Arc::clone(&self.tracker),
        }
    }

    /// Address actually bound (resolves ephemeral ports)
    pub fn bound_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Base URL derived from the bound address
    pub fn base_url(&self) -> &str {
        &self.tracker.base_url
    }
}

impl Listener for TrackingListener {
    type Io = TrackedStream;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        loop {
            let accepted = {
                let Some(listener) = self.inner.as_ref() else {
                    return std::future::pending().await;
                };

                tokio::select! {
                    result = listener.accept() => Some(result),
                    () = wait_for_drain(&mut self.state) => None,
                }
            };

            match accepted {
                None => {
                    // Closing the socket hands new connections to whoever else holds it
                    self.inner = None;
                    info!(addr = %self.local_addr, "stopped accepting connections");
                }
                Some(Ok((stream, remote))) => {
                    if self.tracker.is_draining() {
                        debug!(remote = %remote, "refusing connection accepted during drain");
                        continue;
                    }

                    let guard = ConnectionGuard::register(&self.tracker);
                    debug!(remote = %remote, live = self.tracker.live.load(Ordering::SeqCst), "connection accepted");
                    return (TrackedStream { inner: stream, guard }, remote);
                }
                Some(Err(e)) => handle_accept_error(e).await,
            }
        }
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        Ok(self.local_addr)
    }
}

async fn wait_for_drain(state: &mut watch::Receiver<LifecycleState>) {
    loop {
        if *state.borrow_and_update() == LifecycleState::Draining {
            return;
        }
        if state.changed().await.is_err() {
            return;
        }
    }
}

async fn handle_accept_error(e: io::Error) {
    if matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
    ) {
        return;
    }

    // Usually fd exhaustion; back off instead of spinning
    error!(error = %e, "accept error");
    tokio::time::sleep(Duration::from_secs(1)).await;
}

/// Control side of a [`TrackingListener`]
#[derive(Clone, Debug)]
pub struct ListenerHandle {
    tracker: Arc<Tracker>,
}

impl ListenerHandle {
    /// Stop admitting connections; idempotent
    pub fn stop_accepting(&self) {
        let changed = self.tracker.state.send_if_modified(|state| {
            if *state == LifecycleState::Accepting {
                *state = LifecycleState::Draining;
                true
            } else {
                false
            }
        });

        if changed {
            info!(live = self.active_connections(), "draining connections");
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> LifecycleState {
        *self.tracker.state.borrow()
    }

    /// Number of connections accepted and not yet closed
    pub fn active_connections(&self) -> usize {
        self.tracker.live.load(Ordering::SeqCst)
    }

    /// Base URL derived from the bound address
    pub fn base_url(&self) -> &str {
        &self.tracker.base_url
    }

    /// Resolves once [`stop_accepting`](Self::stop_accepting) has been called
    pub fn stopped(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut state = self.tracker.state.subscribe();
        async move { wait_for_drain(&mut state).await }
    }

    /// Wait until every tracked connection has closed
    pub async fn drain(&self) {
        loop {
            let notified = self.tracker.idle.notified();
            tokio::pin!(notified);
            // Register before checking so a close in between is not missed
            notified.as_mut().enable();

            if self.active_connections() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// [`drain`](Self::drain) with a deadline; returns the connections still open
    pub async fn drain_with_timeout(&self, timeout: Duration) -> usize {
        match tokio::time::timeout(timeout, self.drain()).await {
            Ok(()) => 0,
            Err(_) => self.active_connections(),
        }
    }
}

/// Keeps one connection counted as live; releases it on drop
#[derive(Debug)]
pub struct ConnectionGuard {
    tracker: Arc<Tracker>,
}

impl ConnectionGuard {
    fn register(tracker: &Arc<Tracker>) -> Self {
        tracker.live.fetch_add(1, Ordering::SeqCst);
        Self {
            tracker: Arc::clone(tracker),
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if self.tracker.live.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.tracker.idle.notify_waiters();
        }
    }
}

pin_project! {
    /// An accepted connection, counted as live until dropped
    #[derive(Debug)]
    pub struct TrackedStream {
        #[pin]
        inner: TcpStream,
        guard: ConnectionGuard,
    }
}

impl TrackedStream {
    /// The underlying TCP stream
    pub fn get_ref(&self) -> &TcpStream {
        &self.inner
    }
}

impl AsyncRead for TrackedStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.project().inner.poll_read(cx, buf)
    }
}

impl AsyncWrite for TrackedStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.project().inner.poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_shutdown(cx)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        self.project().inner.poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    async fn local_listener() -> TrackingListener {
        listen(&"tcp://127.0.0.1:0".parse().unwrap()).await.unwrap()
    }

    #[rstest]
    #[case("tcp://127.0.0.1:8080", ListenAddr::Tcp { addr: "127.0.0.1:8080".into(), family: IpFamily::Any })]
    #[case("tcp4://0.0.0.0:80/", ListenAddr::Tcp { addr: "0.0.0.0:80".into(), family: IpFamily::V4 })]
    #[case("tcp6://[::1]:9000", ListenAddr::Tcp { addr: "[::1]:9000".into(), family: IpFamily::V6 })]
    #[case("localhost:8080", ListenAddr::Tcp { addr: "localhost:8080".into(), family: IpFamily::Any })]
    #[case("tcp://:8080", ListenAddr::Tcp { addr: ":8080".into(), family: IpFamily::Any })]
    #[case("fd://3", ListenAddr::Fd(3))]
    fn test_parse_listen_addr(#[case] input: &str, #[case] expected: ListenAddr) {
        assert_eq!(input.parse::<ListenAddr>().unwrap(), expected);
    }

    #[test]
    fn test_parse_rejects_bad_addresses() {
        assert!(matches!(
            "unix:///tmp/sock".parse::<ListenAddr>(),
            Err(ListenError::UnsupportedScheme(_))
        ));
        assert!(matches!("fd://-1".parse::<ListenAddr>(), Err(ListenError::InvalidFd(_))));
        assert!(matches!("fd://abc".parse::<ListenAddr>(), Err(ListenError::InvalidFd(_))));
        assert!(matches!(
            "tcp://localhost".parse::<ListenAddr>(),
            Err(ListenError::InvalidAddress(_))
        ));
        assert!(matches!(
            "tcp://localhost:http".parse::<ListenAddr>(),
            Err(ListenError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_display_round_trips_scheme() {
        let addr: ListenAddr = "tcp6://[::1]:9000".parse().unwrap();
        assert_eq!(addr.to_string(), "tcp6://[::1]:9000");
        assert_eq!(ListenAddr::Fd(4).to_string(), "fd://4");
    }

    #[tokio::test]
    async fn test_base_url_after_bind() {
        let listener = local_listener().await;
        let port = listener.bound_addr().port();

        assert_ne!(port, 0);
        assert_eq!(listener.base_url(), format!("http://127.0.0.1:{}", port));
        assert_eq!(listener.handle().base_url(), listener.base_url());
    }

    #[tokio::test]
    async fn test_connections_are_tracked() {
        let mut listener = local_listener().await;
        let handle = listener.handle();
        let addr = listener.bound_addr();

        let _client_a = TcpStream::connect(addr).await.unwrap();
        let _client_b = TcpStream::connect(addr).await.unwrap();
        let (a, _) = listener.accept().await;
        let (b, _) = listener.accept().await;
        assert_eq!(handle.active_connections(), 2);

        drop(a);
        assert_eq!(handle.active_connections(), 1);
        drop(b);
        assert_eq!(handle.active_connections(), 0);
    }

    #[tokio::test]
    async fn test_stop_accepting_closes_socket() {
        let mut listener = local_listener().await;
        let handle = listener.handle();
        let addr = listener.bound_addr();

        handle.stop_accepting();
        handle.stop_accepting();
        assert_eq!(handle.state(), LifecycleState::Draining);

        let pending = tokio::time::timeout(Duration::from_millis(100), listener.accept()).await;
        assert!(pending.is_err());
        assert!(TcpStream::connect(addr).await.is_err());
        assert_eq!(handle.active_connections(), 0);
    }

    #[tokio::test]
    async fn test_drain_waits_for_live_connections() {
        let mut listener = local_listener().await;
        let handle = listener.handle();
        let addr = listener.bound_addr();

        let _client = TcpStream::connect(addr).await.unwrap();
        let (stream, _) = listener.accept().await;

        handle.stop_accepting();
        let drain = tokio::spawn({
            let handle = handle.clone();
            async move { handle.drain().await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!drain.is_finished());

        drop(stream);
        tokio::time::timeout(Duration::from_secs(1), drain)
            .await
            .expect("drain should finish once the connection closes")
            .unwrap();
        assert_eq!(handle.active_connections(), 0);
    }

    #[tokio::test]
    async fn test_drain_with_timeout_reports_stragglers() {
        let mut listener = local_listener().await;
        let handle = listener.handle();

        let _client = TcpStream::connect(listener.bound_addr()).await.unwrap();
        let (_stream, _) = listener.accept().await;
        handle.stop_accepting();

        assert_eq!(handle.drain_with_timeout(Duration::from_millis(50)).await, 1);
    }

    #[tokio::test]
    async fn test_drain_returns_immediately_when_idle() {
        let listener = local_listener().await;
        let handle = listener.handle();
        assert_eq!(handle.drain_with_timeout(Duration::from_millis(50)).await, 0);
    }

    #[tokio::test]
    async fn test_stopped_resolves_after_stop() {
        let listener = local_listener().await;
        let handle = listener.handle();
        let stopped = tokio::spawn(handle.stopped());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!stopped.is_finished());

        handle.stop_accepting();
        tokio::time::timeout(Duration::from_secs(1), stopped)
            .await
            .unwrap()
            .unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_listen_on_inherited_fd() {
        use std::os::unix::io::IntoRawFd;

        let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = std_listener.local_addr().unwrap();
        let fd = std_listener.into_raw_fd();

        let mut listener = listen(&ListenAddr::Fd(fd)).await.unwrap();
        assert_eq!(listener.bound_addr(), addr);

        let _client = TcpStream::connect(addr).await.unwrap();
        let (_stream, remote) = listener.accept().await;
        assert!(remote.ip().is_loopback());
    }
}
