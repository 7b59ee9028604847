//! Nickname resolution for a table surface.
//!
//! A cached nickname is reused while it is fresh and the region still shows
//! the same pixels (compared by perceptual hash). Otherwise the region is
//! captured and run through the recognition strategies in order, with one
//! extra capture pass after re-clicking the seat if every strategy came back
//! empty.

use std::sync::Arc;
use std::time::Instant;

use crate::capture::{save_debug_capture, CaptureRegion, SurfaceCapture, TableSurface};
use crate::nickname::cache::{NicknameCache, NicknameCacheEntry};
use crate::ocr::{content_hash, RecognitionCandidate, Recognizer};

/// Longest nickname the stats server accepts.
pub const MAX_NICKNAME_LEN: usize = 25;

/// Extra capture passes after the first one.
const MAX_RETRIES: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("no nickname found on surface {surface} after {attempts} capture pass(es)")]
    NotFound { surface: TableSurface, attempts: u32 },
}

pub struct NicknameResolver {
    capture: Arc<dyn SurfaceCapture>,
    strategies: Vec<Arc<dyn Recognizer>>,
    cache: Arc<NicknameCache>,
    reveal_click: bool,
    save_captures: bool,
}

impl NicknameResolver {
    /// `strategies` are tried in order; the first one producing text wins.
    pub fn new(
        capture: Arc<dyn SurfaceCapture>,
        strategies: Vec<Arc<dyn Recognizer>>,
        cache: Arc<NicknameCache>,
    ) -> Self {
        Self {
            capture,
            strategies,
            cache,
            reveal_click: true,
            save_captures: false,
        }
    }

    /// Whether the first capture pass clicks the seat first. Retries always do.
    pub fn with_reveal_click(mut self, reveal_click: bool) -> Self {
        self.reveal_click = reveal_click;
        self
    }

    pub fn with_save_captures(mut self, save_captures: bool) -> Self {
        self.save_captures = save_captures;
        self
    }

    pub fn cache(&self) -> &Arc<NicknameCache> {
        &self.cache
    }

    /// Resolves the nickname shown in `region` of `surface`.
    pub fn resolve(
        &self,
        surface: TableSurface,
        region: &CaptureRegion,
        force_fresh: bool,
    ) -> Result<String, ResolveError> {
        if !force_fresh {
            if let Some(nickname) = self.cached_if_unchanged(surface, region) {
                return Ok(nickname);
            }
        }

        for pass in 0..=MAX_RETRIES {
            if pass > 0 {
                log::info!(
                    "Surface {}: no text on pass {}, re-clicking and retrying",
                    surface,
                    pass
                );
            }

            if self.reveal_click || pass > 0 {
                if let Err(e) = self.capture.reveal(surface, region) {
                    log::warn!("Surface {}: reveal click failed: {}", surface, e);
                }
            }

            let img = match self.capture.capture(surface, region) {
                Ok(img) => img,
                Err(e) => {
                    log::warn!("Surface {}: capture failed: {}", surface, e);
                    continue;
                }
            };

            if self.save_captures {
                match save_debug_capture(&img) {
                    Ok(path) => log::debug!("Capture saved to {}", path.display()),
                    Err(e) => log::warn!("{}", e),
                }
            }

            let Some(candidates) = self.recognize_with_fallback(&img) else {
                continue;
            };
            let Some(nickname) = select_best(&candidates) else {
                continue;
            };

            self.cache.store(NicknameCacheEntry {
                surface,
                nickname: nickname.clone(),
                resolved_at: Instant::now(),
                content_hash: content_hash(&img),
            });
            log::info!("Surface {}: nickname detected: '{}'", surface, nickname);
            return Ok(nickname);
        }

        log::warn!("Surface {}: no nickname detected", surface);
        Err(ResolveError::NotFound {
            surface,
            attempts: MAX_RETRIES + 1,
        })
    }

    /// Returns the cached nickname if it is fresh and the region looks the same.
    fn cached_if_unchanged(&self, surface: TableSurface, region: &CaptureRegion) -> Option<String> {
        let entry = self.cache.fresh(surface)?;

        let img = match self.capture.capture(surface, region) {
            Ok(img) => img,
            Err(e) => {
                log::warn!("Surface {}: hash probe failed: {}", surface, e);
                return None;
            }
        };

        if content_hash(&img) == entry.content_hash {
            log::info!(
                "Surface {}: nickname from cache: '{}'",
                surface,
                entry.nickname
            );
            Some(entry.nickname)
        } else {
            log::info!("Surface {}: player changed, resolving again", surface);
            None
        }
    }

    /// Runs strategies in order until one yields at least one candidate.
    ///
    /// Engine errors count as "no candidates" for that strategy.
    fn recognize_with_fallback(
        &self,
        img: &image::RgbaImage,
    ) -> Option<Vec<RecognitionCandidate>> {
        for strategy in &self.strategies {
            match strategy.recognize(img) {
                Ok(candidates) => {
                    let candidates: Vec<_> = candidates
                        .into_iter()
                        .filter(|c| !c.text.trim().is_empty())
                        .collect();
                    if !candidates.is_empty() {
                        log::debug!(
                            "Recognizer '{}' produced {} candidate(s)",
                            strategy.name(),
                            candidates.len()
                        );
                        return Some(candidates);
                    }
                    log::debug!("Recognizer '{}' found no text", strategy.name());
                }
                Err(e) => {
                    log::warn!("Recognizer '{}' failed: {}", strategy.name(), e);
                }
            }
        }
        None
    }
}

/// Picks the highest-confidence candidate (first one on ties), truncated to
/// `MAX_NICKNAME_LEN` characters and trimmed.
pub fn select_best(candidates: &[RecognitionCandidate]) -> Option<String> {
    let best = candidates
        .iter()
        .reduce(|best, c| if c.confidence > best.confidence { c } else { best })?;

    let nickname: String = best
        .text
        .trim()
        .chars()
        .take(MAX_NICKNAME_LEN)
        .collect::<String>()
        .trim()
        .to_string();

    if nickname.is_empty() { None } else { Some(nickname) }
}
