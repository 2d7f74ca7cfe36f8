//! Blocking, rate-limited client for the regulator's public endpoints.
//!
//! Every request first takes a token from a [`TokenBucket`]. Clients built
//! with default settings share one process-wide bucket sized to the
//! archive's fair-access budget (10 requests per second).

use crate::{Error, Result};
use log::{info, warn};
use once_cell::sync::OnceCell;
use parking_lot::{Condvar, Mutex};
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const DEFAULT_RATE: u32 = 10;
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

// Upper bound on one wait so cancellation is noticed promptly.
const CANCEL_POLL: Duration = Duration::from_millis(25);

static SHARED_LIMITER: OnceCell<Arc<TokenBucket>> = OnceCell::new();

/// Cooperative cancellation for a blocked [`TokenBucket::acquire`].
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Fixed quota of `capacity` tokens, restored in full once per `interval`.
///
/// Refill happens lazily inside `acquire`/`try_acquire`; there is no
/// background timer.
pub struct TokenBucket {
    capacity: u32,
    interval: Duration,
    state: Mutex<BucketState>,
    refilled: Condvar,
}

struct BucketState {
    tokens: u32,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(capacity: u32, interval: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            interval,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            refilled: Condvar::new(),
        }
    }

    /// The process-wide bucket used by clients without their own limits.
    pub fn shared() -> Arc<TokenBucket> {
        SHARED_LIMITER
            .get_or_init(|| Arc::new(TokenBucket::new(DEFAULT_RATE, DEFAULT_INTERVAL)))
            .clone()
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Tokens left in the current interval.
    pub fn available(&self) -> u32 {
        let mut state = self.state.lock();
        self.refill(&mut state, Instant::now());
        state.tokens
    }

    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock();
        self.refill(&mut state, Instant::now());
        if state.tokens == 0 {
            return false;
        }
        state.tokens -= 1;
        true
    }

    /// Blocks the calling thread until a token is available or `cancel`
    /// fires.
    pub fn acquire(&self, cancel: &CancelToken) -> Result<()> {
        let mut state = self.state.lock();
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let now = Instant::now();
            self.refill(&mut state, now);
            if state.tokens > 0 {
                state.tokens -= 1;
                return Ok(());
            }

            let wait = state
                .last_refill
                .checked_add(self.interval)
                .map_or(CANCEL_POLL, |next| next.saturating_duration_since(now))
                .min(CANCEL_POLL);
            self.refilled.wait_for(&mut state, wait);
        }
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        if now.saturating_duration_since(state.last_refill) >= self.interval {
            state.tokens = self.capacity;
            state.last_refill = now;
            self.refilled.notify_all();
        }
    }
}

/// A response as seen by the client: status plus an unread body.
pub struct Response {
    pub status: u16,
    pub body: Box<dyn Read + Send>,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends one GET. Implementations do not rate limit or inspect status.
pub trait Transport: Send + Sync {
    fn get(&self, url: &str, user_agent: &str) -> Result<Response>;
}

pub struct HttpTransport {
    inner: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        // The archive misbehaves with HTTP/2 on long transfers.
        let inner = reqwest::blocking::Client::builder()
            .http1_only()
            .timeout(timeout)
            .build()?;
        Ok(Self { inner })
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str, user_agent: &str) -> Result<Response> {
        let response = self
            .inner
            .get(url)
            .header(reqwest::header::USER_AGENT, user_agent)
            .send()?;
        Ok(Response {
            status: response.status().as_u16(),
            body: Box::new(response),
        })
    }
}

pub struct Client {
    transport: Box<dyn Transport>,
    limiter: Arc<TokenBucket>,
    user_agent: String,
}

impl Client {
    /// The regulator rejects requests without a descriptive User-Agent
    /// (`"Company Name admin@example.com"`).
    pub fn builder(user_agent: impl Into<String>) -> ClientBuilder {
        ClientBuilder {
            user_agent: user_agent.into(),
            rate: None,
            interval: None,
            timeout: None,
            transport: None,
            limiter: None,
        }
    }

    pub fn new(user_agent: impl Into<String>) -> Result<Self> {
        Self::builder(user_agent).build()
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn limiter(&self) -> &Arc<TokenBucket> {
        &self.limiter
    }

    /// Fetches `url` and returns its body. Any non-2xx status is
    /// [`Error::Request`].
    pub fn fetch(&self, url: &str) -> Result<Box<dyn Read + Send>> {
        self.fetch_cancellable(url, &CancelToken::default())
    }

    pub fn fetch_cancellable(&self, url: &str, cancel: &CancelToken) -> Result<Box<dyn Read + Send>> {
        self.limiter.acquire(cancel)?;

        info!("GET {}", url);
        let response = self.transport.get(url, &self.user_agent)?;
        if !response.is_success() {
            warn!("GET {} returned {}", url, response.status);
            return Err(Error::Request {
                status: response.status,
                url: url.to_string(),
            });
        }
        Ok(response.body)
    }

    /// Streams the body of `url` into `writer`, returning the bytes copied.
    pub fn copy_to<W: Write + ?Sized>(&self, url: &str, writer: &mut W) -> Result<u64> {
        let mut body = self.fetch(url)?;
        Ok(io::copy(&mut body, writer)?)
    }
}

pub struct ClientBuilder {
    user_agent: String,
    rate: Option<u32>,
    interval: Option<Duration>,
    timeout: Option<Duration>,
    transport: Option<Box<dyn Transport>>,
    limiter: Option<Arc<TokenBucket>>,
}

impl ClientBuilder {
    /// Requests allowed per interval. Gives the client its own bucket.
    pub fn rate(mut self, rate: u32) -> Self {
        self.rate = Some(rate);
        self
    }

    /// Refill interval. Gives the client its own bucket.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    /// Shares an existing bucket, overriding `rate`/`interval`.
    pub fn limiter(mut self, limiter: Arc<TokenBucket>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn build(self) -> Result<Client> {
        let limiter = match (self.limiter, self.rate, self.interval) {
            (Some(limiter), _, _) => limiter,
            (None, None, None) => TokenBucket::shared(),
            (None, rate, interval) => Arc::new(TokenBucket::new(
                rate.unwrap_or(DEFAULT_RATE),
                interval.unwrap_or(DEFAULT_INTERVAL),
            )),
        };

        let transport = match self.transport {
            Some(transport) => transport,
            None => Box::new(HttpTransport::new(self.timeout)?),
        };

        Ok(Client {
            transport,
            limiter,
            user_agent: self.user_agent,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::io::Cursor;
    use std::thread;

    /// Serves canned bodies by URL and records every request.
    #[derive(Default, Clone)]
    pub(crate) struct FakeTransport {
        pub(crate) routes: Arc<HashMap<String, (u16, Vec<u8>)>>,
        pub(crate) requests: Arc<Mutex<Vec<(String, String)>>>,
    }

    impl FakeTransport {
        pub(crate) fn with_routes(routes: &[(&str, u16, &[u8])]) -> Self {
            let routes = routes
                .iter()
                .map(|(url, status, body)| (url.to_string(), (*status, body.to_vec())))
                .collect();
            Self {
                routes: Arc::new(routes),
                requests: Arc::default(),
            }
        }
    }

    impl Transport for FakeTransport {
        fn get(&self, url: &str, user_agent: &str) -> Result<Response> {
            self.requests
                .lock()
                .push((url.to_string(), user_agent.to_string()));
            let (status, body) = self.routes.get(url).cloned().unwrap_or((404, Vec::new()));
            Ok(Response {
                status,
                body: Box::new(Cursor::new(body)),
            })
        }
    }

    pub(crate) fn client(transport: FakeTransport) -> Client {
        Client::builder("edgarx tests test@example.com")
            .rate(1000)
            .transport(transport)
            .build()
            .unwrap()
    }

    #[test]
    fn test_bucket_quota() {
        let bucket = TokenBucket::new(3, Duration::from_secs(60));
        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());
        assert_eq!(bucket.available(), 0);
    }

    #[test]
    fn test_bucket_refills_after_interval() {
        let bucket = TokenBucket::new(2, Duration::from_millis(20));
        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());
        thread::sleep(Duration::from_millis(30));
        assert_eq!(bucket.available(), 2);
    }

    #[test]
    fn test_acquire_waits_for_refill() {
        let bucket = TokenBucket::new(1, Duration::from_millis(40));
        let cancel = CancelToken::new();
        bucket.acquire(&cancel).unwrap();

        let start = Instant::now();
        bucket.acquire(&cancel).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_acquire_honours_cancellation() {
        let bucket = Arc::new(TokenBucket::new(1, Duration::from_secs(3600)));
        let cancel = CancelToken::new();
        bucket.acquire(&cancel).unwrap();

        let waiter = {
            let bucket = Arc::clone(&bucket);
            let cancel = cancel.clone();
            thread::spawn(move || bucket.acquire(&cancel))
        };
        thread::sleep(Duration::from_millis(50));
        cancel.cancel();

        let result = waiter.join().unwrap();
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[test]
    fn test_unbounded_interval_still_cancels() {
        let bucket = Arc::new(TokenBucket::new(1, Duration::MAX));
        let cancel = CancelToken::new();
        bucket.acquire(&cancel).unwrap();

        let waiter = {
            let bucket = Arc::clone(&bucket);
            let cancel = cancel.clone();
            thread::spawn(move || bucket.acquire(&cancel))
        };
        thread::sleep(Duration::from_millis(50));
        cancel.cancel();

        let result = waiter.join().unwrap();
        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(!bucket.try_acquire());
    }

    #[test]
    fn test_fetch_sends_user_agent() {
        let transport = FakeTransport::with_routes(&[("https://example.test/a", 200, b"hello")]);
        let client = client(transport.clone());

        let mut out = Vec::new();
        let copied = client.copy_to("https://example.test/a", &mut out).unwrap();
        assert_eq!(copied, 5);
        assert_eq!(out, b"hello");

        let requests = transport.requests.lock();
        assert_eq!(
            requests.as_slice(),
            &[(
                "https://example.test/a".to_string(),
                "edgarx tests test@example.com".to_string()
            )]
        );
    }

    #[test]
    fn test_non_success_status_is_an_error() {
        let transport = FakeTransport::with_routes(&[("https://example.test/gone", 403, b"")]);
        let err = client(transport).fetch("https://example.test/gone").err().unwrap();
        match err {
            Error::Request { status, url } => {
                assert_eq!(status, 403);
                assert_eq!(url, "https://example.test/gone");
            }
            other => panic!("expected request error, got {other}"),
        }
    }

    #[test]
    fn test_default_builder_uses_shared_limiter() {
        let a = Client::builder("a a@example.com")
            .transport(FakeTransport::default())
            .build()
            .unwrap();
        let b = Client::builder("b b@example.com")
            .transport(FakeTransport::default())
            .build()
            .unwrap();
        assert!(Arc::ptr_eq(a.limiter(), b.limiter()));
        assert_eq!(a.limiter().capacity(), DEFAULT_RATE);
    }
}
