use context_admission as ca;
use ca::{AdmissionConfig, Cleanup, ContextRegistry, ManualClock};
use pretty_assertions::assert_eq;
use std::cell::RefCell;
use std::rc::Rc;

type Log = Rc<RefCell<Vec<String>>>;

fn tracked(log: &Log, id: &str) -> Cleanup {
    let log = log.clone();
    let id = id.to_string();
    Cleanup::new(move || log.borrow_mut().push(id))
}

fn live_ids(reg: &ContextRegistry<ManualClock>) -> Vec<String> {
    let mut ids: Vec<_> = reg.snapshot().into_iter().map(|o| o.id).collect();
    ids.sort();
    ids
}

#[test]
fn test_capacity_three_evicts_lowest_priority() {
    let log = Log::default();
    let clock = ManualClock::new();
    let mut reg = ContextRegistry::with_clock(AdmissionConfig::with_capacity(3), clock.clone()).unwrap();

    for (id, pri) in [("A", 1), ("B", 2), ("C", 3)] {
        reg.register(id, tracked(&log, id), pri).unwrap();
        clock.advance(1);
    }
    assert_eq!(reg.len(), 3);

    let admission = reg.register("D", tracked(&log, "D"), 1).unwrap();

    assert_eq!(admission.evicted.as_deref(), Some("A"));
    assert_eq!(reg.len(), 3);
    assert_eq!(live_ids(&reg), vec!["B", "C", "D"]);
    assert_eq!(*log.borrow(), vec!["A".to_string()]);
}

#[test]
fn test_tie_on_priority_evicts_oldest() {
    let clock = ManualClock::new();
    let mut reg = ContextRegistry::with_clock(AdmissionConfig::with_capacity(3), clock.clone()).unwrap();

    clock.set(30);
    reg.register("young", Cleanup::noop(), 0).unwrap();
    clock.set(10);
    reg.register("old", Cleanup::noop(), 0).unwrap();
    clock.set(40);
    reg.register("keeper", Cleanup::noop(), 7).unwrap();

    let admission = reg.register("new", Cleanup::noop(), 0).unwrap();

    assert_eq!(admission.evicted.as_deref(), Some("old"));
    assert!(reg.contains("young"));
}

#[test]
fn test_one_eviction_per_register() {
    let log = Log::default();
    let mut reg = ContextRegistry::with_clock(AdmissionConfig::with_capacity(2), ManualClock::new()).unwrap();
    for id in ["a", "b", "c", "d", "e"] {
        reg.register(id, tracked(&log, id), 0).unwrap();
        assert!(reg.len() <= 2);
    }
    assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
    assert_eq!(live_ids(&reg), vec!["d", "e"]);
}

#[test]
fn test_default_capacity_is_twelve() {
    let mut reg = ca::default_registry().unwrap();
    for i in 0..20 {
        reg.register(format!("viewer-{i}"), Cleanup::noop(), 0).unwrap();
    }
    assert_eq!(reg.len(), ca::MAX_CONTEXTS);
    assert!(reg.is_near_limit());
}
