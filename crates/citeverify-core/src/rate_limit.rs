//! Request pacing for the remote services the cascade talks to.
//!
//! Every outbound call waits on the [`Throttle`] of its [`Service`], so the
//! spacing holds across all references being verified at once. A 429 from a
//! service doubles its spacing; a minute without one puts it back.

use std::num::NonZeroU32;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use arc_swap::ArcSwap;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use tokio::time::Instant;

type Governor = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Spacing never grows past this multiple of the base period.
const MAX_SLOWDOWN: u32 = 16;

const QUIET_PERIOD: Duration = Duration::from_secs(60);

/// A remote service with its own request quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    Crossref,
    Arxiv,
    SemanticScholar,
    /// Arbitrary cited web pages. Not paced.
    Webpage,
    /// The language model behind grounded search and extraction.
    LanguageModel,
}

impl Service {
    /// Display name, also used as the retry log label.
    pub fn name(self) -> &'static str {
        match self {
            Service::Crossref => "Crossref",
            Service::Arxiv => "arXiv",
            Service::SemanticScholar => "Semantic Scholar",
            Service::Webpage => "Webpage",
            Service::LanguageModel => "Gemini",
        }
    }
}

fn governor_for(period: Duration) -> Arc<Governor> {
    let quota = Quota::with_period(period).unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN));
    Arc::new(Governor::direct(quota))
}

#[derive(Debug)]
struct Backoff {
    slowdown: u32,
    last_rate_limited: Option<Instant>,
}

/// Paces requests to one service and slows down when it pushes back.
pub struct Throttle {
    base: Duration,
    governor: ArcSwap<Governor>,
    backoff: Mutex<Backoff>,
}

impl std::fmt::Debug for Throttle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Throttle")
            .field("period", &self.period())
            .finish()
    }
}

impl Throttle {
    /// At most one request per `period`.
    pub fn every(period: Duration) -> Self {
        Self {
            base: period,
            governor: ArcSwap::new(governor_for(period)),
            backoff: Mutex::new(Backoff {
                slowdown: 1,
                last_rate_limited: None,
            }),
        }
    }

    pub fn per_second(n: u32) -> Self {
        Self::every(Duration::from_secs(1) / n.max(1))
    }

    fn backoff(&self) -> MutexGuard<'_, Backoff> {
        self.backoff.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current spacing between requests.
    pub fn period(&self) -> Duration {
        self.base * self.backoff().slowdown
    }

    /// Wait for this service's next request slot.
    pub async fn acquire(&self) {
        self.restore_if_quiet();
        let governor = self.governor.load_full();
        governor.until_ready().await;
    }

    /// The service answered 429: double the spacing, up to [`MAX_SLOWDOWN`].
    pub fn record_rate_limited(&self) {
        let mut backoff = self.backoff();
        backoff.last_rate_limited = Some(Instant::now());
        if backoff.slowdown < MAX_SLOWDOWN {
            backoff.slowdown *= 2;
            let period = self.base * backoff.slowdown;
            self.governor.store(governor_for(period));
            tracing::debug!(period_ms = period.as_millis() as u64, "slowing down after 429");
        }
    }

    fn restore_if_quiet(&self) {
        let mut backoff = self.backoff();
        let quiet = backoff
            .last_rate_limited
            .is_some_and(|at| at.elapsed() >= QUIET_PERIOD);
        if backoff.slowdown > 1 && quiet {
            backoff.slowdown = 1;
            self.governor.store(governor_for(self.base));
        }
    }
}

/// One [`Throttle`] per paced service, shared by every source and the extractor.
pub struct RateLimiters {
    crossref: Option<Throttle>,
    arxiv: Option<Throttle>,
    semantic_scholar: Option<Throttle>,
    language_model: Option<Throttle>,
}

impl Default for RateLimiters {
    fn default() -> Self {
        Self::new(false, false)
    }
}

impl std::fmt::Debug for RateLimiters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiters")
            .field("crossref", &self.crossref)
            .field("arxiv", &self.arxiv)
            .field("semantic_scholar", &self.semantic_scholar)
            .field("language_model", &self.language_model)
            .finish()
    }
}

impl RateLimiters {
    /// Crossref allows 3/s in its polite pool (mailto set), 1/s otherwise.
    /// arXiv asks for one request every 3s. Semantic Scholar allows 1/s
    /// with an API key and roughly one per 3s without.
    pub fn new(has_crossref_mailto: bool, has_s2_api_key: bool) -> Self {
        Self {
            crossref: Some(Throttle::per_second(if has_crossref_mailto { 3 } else { 1 })),
            arxiv: Some(Throttle::every(Duration::from_secs(3))),
            semantic_scholar: Some(if has_s2_api_key {
                Throttle::per_second(1)
            } else {
                Throttle::every(Duration::from_secs(3))
            }),
            language_model: Some(Throttle::per_second(2)),
        }
    }

    /// No pacing at all. Used by tests and offline mocks.
    pub fn unlimited() -> Self {
        Self {
            crossref: None,
            arxiv: None,
            semantic_scholar: None,
            language_model: None,
        }
    }

    pub fn get(&self, service: Service) -> Option<&Throttle> {
        match service {
            Service::Crossref => self.crossref.as_ref(),
            Service::Arxiv => self.arxiv.as_ref(),
            Service::SemanticScholar => self.semantic_scholar.as_ref(),
            Service::LanguageModel => self.language_model.as_ref(),
            Service::Webpage => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_429_doubles_spacing_up_to_the_cap() {
        let throttle = Throttle::per_second(10);
        assert_eq!(throttle.period(), Duration::from_millis(100));

        throttle.record_rate_limited();
        assert_eq!(throttle.period(), Duration::from_millis(200));
        throttle.record_rate_limited();
        assert_eq!(throttle.period(), Duration::from_millis(400));

        for _ in 0..10 {
            throttle.record_rate_limited();
        }
        assert_eq!(throttle.period(), Duration::from_millis(1600));
    }

    #[tokio::test(start_paused = true)]
    async fn base_rate_returns_after_a_quiet_minute() {
        let throttle = Throttle::per_second(10);
        throttle.record_rate_limited();
        throttle.record_rate_limited();

        tokio::time::advance(Duration::from_secs(30)).await;
        throttle.acquire().await;
        assert_eq!(throttle.period(), Duration::from_millis(400));

        tokio::time::advance(Duration::from_secs(31)).await;
        throttle.acquire().await;
        assert_eq!(throttle.period(), Duration::from_millis(100));
    }

    #[test]
    fn quotas_follow_credentials() {
        let anonymous = RateLimiters::new(false, false);
        let identified = RateLimiters::new(true, true);

        let period = |limiters: &RateLimiters, service| limiters.get(service).unwrap().period();
        assert_eq!(period(&anonymous, Service::Crossref), Duration::from_secs(1));
        assert!(period(&identified, Service::Crossref) < Duration::from_secs(1));
        assert_eq!(period(&anonymous, Service::SemanticScholar), Duration::from_secs(3));
        assert_eq!(period(&identified, Service::SemanticScholar), Duration::from_secs(1));
        assert_eq!(period(&anonymous, Service::Arxiv), Duration::from_secs(3));
        assert_eq!(period(&anonymous, Service::LanguageModel), Duration::from_millis(500));
    }

    #[test]
    fn web_pages_and_unlimited_sets_are_not_paced() {
        assert!(RateLimiters::default().get(Service::Webpage).is_none());
        let unlimited = RateLimiters::unlimited();
        assert!(unlimited.get(Service::Crossref).is_none());
        assert!(unlimited.get(Service::LanguageModel).is_none());
    }
}
