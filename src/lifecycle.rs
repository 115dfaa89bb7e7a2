//! Viewer lifecycle as seen by the admission controller.
//!
//! A panorama viewer is admitted when it becomes ready and released when it
//! is destroyed. Eviction destroys the viewer from the registry side, so the
//! state lives behind an `Rc` the registered cleanup can reach.

use std::cell::Cell;
use std::rc::Rc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::errors::{AdmissionError, Result};
use crate::registry::{Admission, Cleanup, ContextRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewerState {
    Uninitialized,
    Initializing,
    Ready,
    Error,
    Destroyed,
}

/// The rendering engine's handle on one drawing surface.
pub trait PanoramaSurface {
    /// Free the underlying context. Called at most once.
    fn destroy(&mut self);
}

#[derive(Debug)]
pub struct ViewerLifecycle {
    id: String,
    priority: i32,
    state: Rc<Cell<ViewerState>>,
    // Set while this viewer holds its registry slot; its cleanup clears it.
    admitted: Rc<Cell<bool>>,
}

impl ViewerLifecycle {
    pub fn new(id: impl Into<String>, priority: i32) -> Self {
        Self {
            id: id.into(),
            priority,
            state: Rc::new(Cell::new(ViewerState::Uninitialized)),
            admitted: Rc::new(Cell::new(false)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> ViewerState {
        self.state.get()
    }

    /// Whether this viewer currently holds a registry slot.
    pub fn is_admitted(&self) -> bool {
        self.admitted.get()
    }

    pub fn begin(&mut self) -> Result<()> {
        self.transition(&[ViewerState::Uninitialized], ViewerState::Initializing)
    }

    /// The surface finished loading: admit it.
    ///
    /// If admission fails the surface is destroyed and the viewer ends `Destroyed`.
    pub fn ready<C, S>(&mut self, registry: &mut ContextRegistry<C>, surface: S) -> Result<Admission>
    where
        C: Clock,
        S: PanoramaSurface + 'static,
    {
        self.transition(&[ViewerState::Initializing], ViewerState::Ready)?;

        let state = self.state.clone();
        let admitted = self.admitted.clone();
        let mut surface = surface;
        let cleanup = Cleanup::new(move || {
            admitted.set(false);
            surface.destroy();
            state.set(ViewerState::Destroyed);
        });
        let admission = registry.register(self.id.clone(), cleanup, self.priority)?;
        self.admitted.set(true);
        Ok(admission)
    }

    pub fn fail(&mut self, reason: &str) -> Result<()> {
        warn!(id = %self.id, reason, "viewer reported an error");
        self.transition(
            &[ViewerState::Initializing, ViewerState::Ready],
            ViewerState::Error,
        )
    }

    /// User interaction bumps the viewer's priority so it survives pressure longer.
    pub fn interact<C: Clock>(&mut self, registry: &mut ContextRegistry<C>, priority: i32) -> bool {
        if self.state() != ViewerState::Ready {
            return false;
        }
        self.priority = priority;
        registry.update_priority(&self.id, priority)
    }

    /// Tear down from any state. Already destroyed (or evicted) viewers are left alone.
    pub fn destroy<C: Clock>(&mut self, registry: &mut ContextRegistry<C>) -> Result<()> {
        if self.state() == ViewerState::Destroyed {
            return Ok(());
        }
        // Another viewer may hold the same id now; only release our own slot.
        if self.admitted.get() {
            registry.unregister(&self.id)?;
        }
        self.state.set(ViewerState::Destroyed);
        debug!(id = %self.id, "viewer destroyed");
        Ok(())
    }

    fn transition(&self, from: &[ViewerState], to: ViewerState) -> Result<()> {
        let current = self.state.get();
        if !from.contains(&current) {
            return Err(AdmissionError::InvalidTransition {
                id: self.id.clone(),
                from: current,
                to,
            });
        }
        self.state.set(to);
        Ok(())
    }
}
