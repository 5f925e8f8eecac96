//! Background resolution and crossfading
//!
//! Every board gets a background resolved by fixed priority: the board's own
//! design, then the active theme preset, then a neutral gradient. Image
//! downloads never block a board transition; a board whose image is not warm
//! yet shows its fallback immediately and crossfades to the image once the
//! load completes. Loads report back over a channel so the engine's select
//! loop stays the only place that touches coordinator state.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::models::BoardInstance;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ImageLoadError {
    #[error("image request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("image fetch for {url} returned status {status}")]
    Status { url: String, status: u16 },
}

// ============================================================================
// Theme presets
// ============================================================================

/// A named background theme the whole display falls back to
#[derive(Debug, Clone, PartialEq)]
pub struct ThemePreset {
    pub name: &'static str,
    pub image_url: Option<String>,
    pub gradient: &'static str,
    pub overlay_color: &'static str,
    pub overlay_opacity: f32,
}

impl ThemePreset {
    pub fn classic() -> Self {
        Self {
            name: "classic",
            image_url: None,
            gradient: "linear-gradient(160deg, #1a2744, #0d1526)",
            overlay_color: "#000000",
            overlay_opacity: 0.35,
        }
    }

    pub fn night() -> Self {
        Self {
            name: "night",
            image_url: None,
            gradient: "linear-gradient(180deg, #05070d, #10131c)",
            overlay_color: "#000000",
            overlay_opacity: 0.55,
        }
    }

    pub fn parchment() -> Self {
        Self {
            name: "parchment",
            image_url: None,
            gradient: "linear-gradient(160deg, #f4ecd8, #e6d8b8)",
            overlay_color: "#3a2f1b",
            overlay_opacity: 0.15,
        }
    }

    /// Look a preset up by name; unknown names fall back to classic
    pub fn by_name(name: &str) -> Self {
        match name {
            "night" => Self::night(),
            "parchment" => Self::parchment(),
            "classic" => Self::classic(),
            other => {
                tracing::warn!(theme = other, "unknown theme preset, using classic");
                Self::classic()
            }
        }
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// The background actually rendered behind a board
#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundResolution {
    /// Image to show, if one is configured and usable
    pub image_url: Option<String>,
    /// Gradient shown when no image is available
    pub gradient: String,
    pub overlay_color: String,
    pub overlay_opacity: f32,
    pub background_opacity: f32,
}

/// Resolve a board's background by priority: board design, theme, gradient
pub fn resolve_background(board: &BoardInstance, theme: &ThemePreset) -> BackgroundResolution {
    let design = board.design.as_ref();

    let image_url = design
        .and_then(|d| d.image_url.clone())
        .or_else(|| theme.image_url.clone());

    BackgroundResolution {
        image_url,
        gradient: theme.gradient.to_string(),
        overlay_color: design
            .and_then(|d| d.overlay_color.clone())
            .unwrap_or_else(|| theme.overlay_color.to_string()),
        overlay_opacity: design
            .and_then(|d| d.overlay_opacity)
            .unwrap_or(theme.overlay_opacity),
        background_opacity: design.and_then(|d| d.background_opacity).unwrap_or(1.0),
    }
}

// ============================================================================
// Image loading
// ============================================================================

/// Completion of an asynchronous image load
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageEvent {
    Loaded(String),
    Failed(String),
}

/// Fetches an image far enough to guarantee the renderer can show it instantly
#[async_trait]
pub trait ImageLoader: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<(), ImageLoadError>;
}

/// Loads images over HTTP, pulling the full body so it lands in the renderer's cache
pub struct HttpImageLoader {
    client: reqwest::Client,
}

impl HttpImageLoader {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

#[async_trait]
impl ImageLoader for HttpImageLoader {
    async fn fetch(&self, url: &str) -> Result<(), ImageLoadError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ImageLoadError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        response.bytes().await?;
        Ok(())
    }
}

/// Loader that treats every image as instantly available; for tests and headless runs
pub struct NullLoader;

#[async_trait]
impl ImageLoader for NullLoader {
    async fn fetch(&self, _url: &str) -> Result<(), ImageLoadError> {
        Ok(())
    }
}

// ============================================================================
// Coordinator
// ============================================================================

/// Two background layers during a crossfade; `previous` fades out under `current`
#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundLayers {
    pub current: Option<BackgroundResolution>,
    pub previous: Option<BackgroundResolution>,
}

/// Tracks the on-screen background and schedules image loads and crossfades
///
/// Returned durations are crossfade lengths the engine arms its fade timer
/// with; when the timer fires it calls [`BackgroundCoordinator::clear_previous`].
pub struct BackgroundCoordinator {
    theme: ThemePreset,
    crossfade: Duration,
    loader: Arc<dyn ImageLoader>,
    events: mpsc::Sender<ImageEvent>,

    current: Option<BackgroundResolution>,
    previous: Option<BackgroundResolution>,
    /// URLs confirmed loadable; swapping to them never defers
    warm: HashSet<String>,
    /// URLs with an in-flight load, warm once their event arrives
    loading: HashSet<String>,
    /// A resolution waiting for its image before it can swap in
    pending: Option<BackgroundResolution>,
}

impl BackgroundCoordinator {
    pub fn new(
        loader: Arc<dyn ImageLoader>,
        theme: ThemePreset,
        crossfade: Duration,
    ) -> (Self, mpsc::Receiver<ImageEvent>) {
        let (tx, rx) = mpsc::channel(16);
        let coordinator = Self {
            theme,
            crossfade,
            loader,
            events: tx,
            current: None,
            previous: None,
            warm: HashSet::new(),
            loading: HashSet::new(),
            pending: None,
        };
        (coordinator, rx)
    }

    /// The layers the renderer should draw right now
    pub fn layers(&self) -> BackgroundLayers {
        BackgroundLayers {
            current: self.current.clone(),
            previous: self.previous.clone(),
        }
    }

    /// A new board came on screen; returns the crossfade to arm, if any
    ///
    /// An unchanged image URL swaps without any crossfade. A cold image defers
    /// the swap until its load event arrives; the outgoing background stays up
    /// in the meantime.
    pub fn on_board_change(&mut self, board: &BoardInstance) -> Option<Duration> {
        let resolution = resolve_background(board, &self.theme);

        // Supersede any swap still waiting on an image. Its load keeps
        // running: the completion event warms the URL for when the board
        // comes around again.
        self.pending = None;

        let current_url = self.current.as_ref().and_then(|r| r.image_url.as_deref());
        if self.current.is_some() && current_url == resolution.image_url.as_deref() {
            // Same image, tweak overlays in place with no fade
            self.current = Some(resolution);
            return None;
        }

        match resolution.image_url.clone() {
            Some(url) if !self.warm.contains(&url) => {
                if !self.loading.contains(&url) {
                    self.spawn_load(url);
                }
                self.pending = Some(resolution);
                None
            }
            _ => self.swap_to(resolution),
        }
    }

    /// An image load finished; returns the crossfade to arm if a swap completes
    pub fn on_image_event(&mut self, event: ImageEvent) -> Option<Duration> {
        let (url, loaded) = match event {
            ImageEvent::Loaded(url) => (url, true),
            ImageEvent::Failed(url) => (url, false),
        };
        self.loading.remove(&url);
        if loaded {
            self.warm.insert(url.clone());
        } else {
            tracing::warn!(url = %url, "background image failed to load");
        }

        let waiting = self
            .pending
            .as_ref()
            .is_some_and(|p| p.image_url.as_deref() == Some(url.as_str()));
        if !waiting {
            return None;
        }

        let mut resolution = self.pending.take().expect("pending checked above");
        if !loaded {
            // Show the board's fallback layers instead of holding the old board's image
            resolution.image_url = None;
        }
        self.swap_to(resolution)
    }

    /// Warm the images of the boards coming up next
    pub fn preload(&mut self, upcoming: &[&BoardInstance]) {
        let urls: Vec<String> = upcoming
            .iter()
            .filter_map(|b| resolve_background(b, &self.theme).image_url)
            .filter(|url| !self.warm.contains(url) && !self.loading.contains(url))
            .collect();

        for url in urls {
            // Detached: completion arrives through the event channel
            self.spawn_load(url);
        }
    }

    /// The crossfade finished; drop the fading-out layer
    pub fn clear_previous(&mut self) {
        self.previous = None;
    }

    fn swap_to(&mut self, resolution: BackgroundResolution) -> Option<Duration> {
        self.previous = self.current.take();
        self.current = Some(resolution);
        if self.previous.is_some() {
            Some(self.crossfade)
        } else {
            None
        }
    }

    fn spawn_load(&mut self, url: String) {
        self.loading.insert(url.clone());
        let loader = Arc::clone(&self.loader);
        let events = self.events.clone();
        tokio::spawn(async move {
            let event = match loader.fetch(&url).await {
                Ok(()) => ImageEvent::Loaded(url),
                Err(e) => {
                    tracing::debug!(error = %e, "image fetch failed");
                    ImageEvent::Failed(url)
                }
            };
            // Receiver gone means the engine is shutting down
            let _ = events.send(event).await;
        });
    }
}
