//! Wake-word short-circuit cache.
//!
//! Grounded on `helloHandle.py`: when a device reports a wake word the
//! server first checks for a cached greeting clip for that voice/
//! speaker rather than round-tripping through ASR/LLM/TTS for a
//! response as predictable as "I'm here". The cache keys on voice id,
//! refreshes itself in the background using `try_lock` so a cold
//! cache during a burst of wake-word hits only ever triggers one
//! refresh instead of one per concurrent caller, and falls back to a
//! hardcoded response if refresh hasn't completed in time. Entries
//! older than `refresh_after` are still served immediately but kick
//! off a background re-synthesis, per spec's `refresh_time` knob.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

/// How long after a wake word fires the orchestrator should suppress a
/// second wake-word detection, matching `helloHandle.py`'s 3-second
/// post-wake grace window so a trailing echo of the wake phrase itself
/// doesn't retrigger a reply.
pub const WAKE_GRACE_PERIOD: Duration = Duration::from_secs(3);

/// Default `refresh_time`: how stale a cached greeting can get before
/// a hit triggers a background re-synthesis instead of being served
/// forever.
pub const DEFAULT_REFRESH_AFTER: Duration = Duration::from_secs(10);

#[derive(Clone)]
struct CachedGreeting {
    text: String,
    opus_frames: Arc<Vec<Vec<u8>>>,
    cached_at: Instant,
}

/// Synthesizes (once) and caches a greeting clip per voice id.
pub struct WakeWordCache {
    entries: Arc<Mutex<HashMap<String, CachedGreeting>>>,
    /// One refresh-in-flight guard per voice id, created on first
    /// touch and reused thereafter. Held across the entire synthesis
    /// call (not just the lookup) so `try_lock` actually gates
    /// concurrent refreshes of the *same* voice rather than merely
    /// sampling whether some unrelated refresh happened to be running
    /// at the instant of the check.
    refresh_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
    fallback_text: String,
    refresh_after: Duration,
}

impl WakeWordCache {
    pub fn new(fallback_text: impl Into<String>) -> Self {
        Self::with_refresh_after(fallback_text, DEFAULT_REFRESH_AFTER)
    }

    pub fn with_refresh_after(fallback_text: impl Into<String>, refresh_after: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            refresh_locks: Arc::new(Mutex::new(HashMap::new())),
            fallback_text: fallback_text.into(),
            refresh_after,
        }
    }

    async fn refresh_lock_for(&self, voice_id: &str) -> Arc<Mutex<()>> {
        self.refresh_locks
            .lock()
            .await
            .entry(voice_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Return a cached greeting for `voice_id`, synthesizing and
    /// caching it through `synthesize` if this is the first caller to
    /// observe a miss. `synthesize` picks whatever greeting text it
    /// wants to speak and returns it alongside the already Opus-encoded
    /// frames (every [`crate::voice::tts::TtsProvider`] produces Opus
    /// directly, so there is nothing left to decode here). A second
    /// caller for the same `voice_id` arriving while a refresh is
    /// already in flight observes the per-voice lock held and returns
    /// the hardcoded fallback immediately rather than blocking or
    /// triggering a duplicate synthesis call.
    ///
    /// A cache hit older than `refresh_after` is still returned
    /// immediately, but spawns a background refresh under the same
    /// per-voice single-flight lock so the *next* hit gets a fresh
    /// clip without any caller blocking on synthesis.
    pub async fn get_or_refresh<F, Fut>(&self, voice_id: &str, synthesize: F) -> (String, Vec<Vec<u8>>)
    where
        F: FnOnce(String) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = anyhow::Result<(String, Vec<Vec<u8>>)>> + Send + 'static,
    {
        if let Some(entry) = self.entries.lock().await.get(voice_id).cloned() {
            if self.age_of(voice_id).await.is_some_and(|age| age >= self.refresh_after) {
                self.spawn_background_refresh(voice_id, synthesize);
            }
            return (entry.text, (*entry.opus_frames).clone());
        }

        let voice_lock = self.refresh_lock_for(voice_id).await;
        let Ok(_guard) = voice_lock.try_lock() else {
            return (self.fallback_text.clone(), Vec::new());
        };

        match synthesize(voice_id.to_string()).await {
            Ok((text, frames)) => {
                let entry = CachedGreeting {
                    text: text.clone(),
                    opus_frames: Arc::new(frames.clone()),
                    cached_at: Instant::now(),
                };
                self.entries.lock().await.insert(voice_id.to_string(), entry);
                (text, frames)
            }
            Err(_) => (self.fallback_text.clone(), Vec::new()),
        }
    }

    /// Refresh one voice id's entry in the background, without making
    /// any caller wait on it. Guarded by the same per-voice lock
    /// `get_or_refresh` uses, so a refresh already in flight (spawned
    /// by an earlier stale hit) is not duplicated.
    fn spawn_background_refresh<F, Fut>(&self, voice_id: &str, synthesize: F)
    where
        F: FnOnce(String) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = anyhow::Result<(String, Vec<Vec<u8>>)>> + Send + 'static,
    {
        let entries = self.entries.clone();
        let refresh_locks = self.refresh_locks.clone();
        let voice_id = voice_id.to_string();
        tokio::spawn(async move {
            let voice_lock = refresh_locks
                .lock()
                .await
                .entry(voice_id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone();
            let Ok(_guard) = voice_lock.try_lock() else { return };

            match synthesize(voice_id.clone()).await {
                Ok((text, frames)) => {
                    let entry = CachedGreeting { text, opus_frames: Arc::new(frames), cached_at: Instant::now() };
                    entries.lock().await.insert(voice_id, entry);
                }
                Err(e) => {
                    tracing::warn!(voice_id = %voice_id, error = %e, "wake-word cache background refresh failed");
                }
            }
        });
    }

    pub async fn age_of(&self, voice_id: &str) -> Option<Duration> {
        self.entries.lock().await.get(voice_id).map(|e| e.cached_at.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn caches_after_first_synthesis() {
        let cache = WakeWordCache::new("I'm here!");
        let calls = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let calls2 = calls.clone();
        let (text, _frames) = cache
            .get_or_refresh("voice-1", move |_| {
                let calls = calls2.clone();
                async move {
                    calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    Ok(("我在".to_string(), vec![vec![0u8; 4]]))
                }
            })
            .await;
        assert_eq!(text, "我在");
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);

        let calls3 = calls.clone();
        let _ = cache
            .get_or_refresh("voice-1", move |_| {
                let calls = calls3.clone();
                async move {
                    calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    Ok((String::new(), Vec::new()))
                }
            })
            .await;
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_refresh_for_same_voice_is_single_flight() {
        let cache = Arc::new(WakeWordCache::new("I'm here!"));
        let calls = Arc::new(std::sync::atomic::AtomicU32::new(0));

        let make_call = |cache: Arc<WakeWordCache>, calls: Arc<std::sync::atomic::AtomicU32>| async move {
            cache
                .get_or_refresh("voice-1", move |_| {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        Ok(("我在".to_string(), vec![vec![1u8; 2]]))
                    }
                })
                .await
        };

        let (a, b) = tokio::join!(
            make_call(cache.clone(), calls.clone()),
            make_call(cache.clone(), calls.clone())
        );
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        // Exactly one of the two overlapping callers observes the
        // synthesized frames; the other gets the busy fallback.
        assert!(a.1.is_empty() != b.1.is_empty());
    }

    #[tokio::test]
    async fn concurrent_refresh_for_different_voices_does_not_block() {
        let cache = Arc::new(WakeWordCache::new("I'm here!"));
        let calls = Arc::new(std::sync::atomic::AtomicU32::new(0));

        let make_call = |cache: Arc<WakeWordCache>, calls: Arc<std::sync::atomic::AtomicU32>, voice: &'static str| async move {
            cache
                .get_or_refresh(voice, move |_| {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                        Ok(("我在".to_string(), vec![vec![1u8; 2]]))
                    }
                })
                .await
        };

        let (a, b) = tokio::join!(
            make_call(cache.clone(), calls.clone(), "voice-a"),
            make_call(cache.clone(), calls.clone(), "voice-b")
        );
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert!(!a.1.is_empty());
        assert!(!b.1.is_empty());
    }

    #[test]
    fn grace_period_matches_original() {
        assert_eq!(WAKE_GRACE_PERIOD, Duration::from_secs(3));
    }

    #[tokio::test]
    async fn stale_entry_is_served_immediately_and_refreshed_in_background() {
        let cache = Arc::new(WakeWordCache::with_refresh_after("I'm here!", Duration::from_millis(20)));
        let calls = Arc::new(std::sync::atomic::AtomicU32::new(0));

        let synth = |calls: Arc<std::sync::atomic::AtomicU32>| {
            move |_: String| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    Ok(("我在".to_string(), vec![vec![9u8; 1]]))
                }
            }
        };

        let (text, frames) = cache.get_or_refresh("voice-1", synth(calls.clone())).await;
        assert_eq!(text, "我在");
        assert!(!frames.is_empty());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(30)).await;

        // Stale but still present: served from cache immediately, no
        // blocking on the caller, while a refresh is kicked off.
        let (_, frames) = cache.get_or_refresh("voice-1", synth(calls.clone())).await;
        assert!(!frames.is_empty());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }
}
