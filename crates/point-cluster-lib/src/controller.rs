//! Debounced viewport state
//!
//! The controller never clusters by itself. It decides *when* a recompute is
//! due and hands out a [`ClusterTicket`] for it; the ticket's generation is
//! later compared against the controller's to drop stale results.

use crate::Viewport;
use instant::Instant;
use std::time::Duration;

/// A scheduled recompute for one settled viewport
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterTicket {
    generation: u64,
    viewport: Viewport,
}

impl ClusterTicket {
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[inline]
    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }
}

/// Owns the current viewport and debounces pan/zoom events
#[derive(Debug, Clone)]
pub struct ViewportController {
    /// Last viewport a ticket was issued for
    current: Option<Viewport>,
    /// Latest unsettled viewport and the instant it becomes due
    pending: Option<(Viewport, Instant)>,
    debounce: Duration,
    generation: u64,
    min_zoom: u8,
    max_zoom: u8,
}

impl ViewportController {
    pub fn new(debounce: Duration, min_zoom: u8, max_zoom: u8) -> Self {
        Self {
            current: None,
            pending: None,
            debounce,
            generation: 0,
            min_zoom,
            max_zoom,
        }
    }

    /// Record a pan/zoom event
    ///
    /// Every call pushes the deadline back to `now + debounce` (trailing
    /// edge) and invalidates any ticket handed out earlier.
    pub fn on_viewport_change(&mut self, viewport: Viewport, now: Instant) {
        let viewport = self.clamp(viewport);
        self.generation += 1;
        self.pending = Some((viewport, now + self.debounce));
        tracing::trace!(
            "Viewport change at zoom {} (generation {})",
            viewport.zoom,
            self.generation
        );
    }

    /// Issue a ticket if the pending viewport has settled by `now`
    pub fn poll(&mut self, now: Instant) -> Option<ClusterTicket> {
        match self.pending {
            Some((_, deadline)) if now >= deadline => self.flush(),
            _ => None,
        }
    }

    /// Issue a ticket for the pending viewport right away
    pub fn flush(&mut self) -> Option<ClusterTicket> {
        let (viewport, _) = self.pending.take()?;
        self.current = Some(viewport);
        Some(self.ticket(viewport))
    }

    /// Replace the viewport without debouncing
    pub fn set_now(&mut self, viewport: Viewport) -> ClusterTicket {
        let viewport = self.clamp(viewport);
        self.generation += 1;
        self.pending = None;
        self.current = Some(viewport);
        self.ticket(viewport)
    }

    /// Schedule a recompute of the current viewport after a data change
    ///
    /// The recompute is debounced like a viewport change. Returns `false`
    /// when there is no viewport yet.
    pub fn invalidate(&mut self, now: Instant) -> bool {
        let pending = self.pending.map(|(viewport, _)| viewport);
        match pending.or(self.current) {
            Some(viewport) => {
                self.generation += 1;
                self.pending = Some((viewport, now + self.debounce));
                true
            }
            None => false,
        }
    }

    /// Whether a result computed for `ticket` may still be applied
    #[inline]
    pub fn is_current(&self, ticket: &ClusterTicket) -> bool {
        ticket.generation == self.generation
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Instant at which the pending viewport becomes due, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.map(|(_, deadline)| deadline)
    }

    #[inline]
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Viewport of the latest issued ticket
    pub fn current(&self) -> Option<&Viewport> {
        self.current.as_ref()
    }

    #[inline]
    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    fn clamp(&self, mut viewport: Viewport) -> Viewport {
        let (min_zoom, max_zoom) = (self.min_zoom as f64, self.max_zoom as f64);
        viewport.zoom = if viewport.zoom.is_finite() {
            viewport.zoom.clamp(min_zoom, max_zoom)
        } else {
            min_zoom
        };
        viewport
    }

    fn ticket(&self, viewport: Viewport) -> ClusterTicket {
        ClusterTicket {
            generation: self.generation,
            viewport,
        }
    }
}
