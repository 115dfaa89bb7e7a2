//! Replay a JSON script of registry operations and report what happened.
//!
//! ```json
//! { "config": { "max_contexts": 3 },
//!   "steps": [ { "op": "register", "id": "A", "priority": 1 },
//!              { "op": "advance", "by": 10 },
//!              { "op": "cleanup" } ] }
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::ManualClock;
use crate::context::AdmissionConfig;
use crate::errors::{AdmissionError, Result};
use crate::registry::{Cleanup, ContextRegistry, OwnerSnapshot};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Register {
        id: String,
        #[serde(default)]
        priority: i32,
    },
    Unregister {
        id: String,
    },
    UpdatePriority {
        id: String,
        priority: i32,
    },
    Advance {
        by: u64,
    },
    Cleanup,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Script {
    #[serde(default)]
    pub config: Option<AdmissionConfig>,
    pub steps: Vec<Step>,
}

/// Outcome of one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    pub step: usize,
    #[serde(flatten)]
    pub op: Step,
    pub live: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evicted: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub replaced: bool,
    pub near_limit: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub config: AdmissionConfig,
    pub events: Vec<Event>,
    /// Ids in the order their cleanups ran.
    pub released: Vec<String>,
    #[serde(rename = "final")]
    pub live: Vec<OwnerSnapshot>,
}

pub fn parse_script(input: &str) -> Result<Script> {
    let script: Script = serde_json::from_str(input)?;
    if script.steps.is_empty() {
        return Err(AdmissionError::Script("script has no steps".into()));
    }
    Ok(script)
}

/// Run `script` against a fresh registry on a manual clock.
///
/// `config` overrides whatever the script carries.
pub fn replay(script: &Script, config: Option<AdmissionConfig>) -> Result<Report> {
    let config = config.or(script.config).unwrap_or_default();
    let clock = ManualClock::new();
    let mut registry = ContextRegistry::with_clock(config, clock.clone())?;
    let released: Rc<RefCell<Vec<String>>> = Rc::default();
    let mut events = Vec::with_capacity(script.steps.len());

    for (step, op) in script.steps.iter().enumerate() {
        let mut event = Event {
            step,
            op: op.clone(),
            live: 0,
            evicted: None,
            replaced: false,
            near_limit: false,
        };
        match op {
            Step::Register { id, priority } => {
                let log = released.clone();
                let owned = id.clone();
                let admission = registry.register(
                    id.clone(),
                    Cleanup::new(move || log.borrow_mut().push(owned)),
                    *priority,
                )?;
                event.evicted = admission.evicted;
                event.replaced = admission.replaced;
            }
            Step::Unregister { id } => {
                registry.unregister(id)?;
            }
            Step::UpdatePriority { id, priority } => {
                registry.update_priority(id, *priority);
            }
            Step::Advance { by } => clock.advance(*by),
            Step::Cleanup => {
                registry.cleanup_all()?;
            }
        }
        event.live = registry.len();
        event.near_limit = registry.is_near_limit();
        debug!(step, live = event.live, "replayed step");
        events.push(event);
    }

    let live = registry.snapshot();
    // Cleanups from the drop below are not part of the report.
    let released = released.borrow().clone();
    Ok(Report {
        config,
        events,
        released,
        live,
    })
}
