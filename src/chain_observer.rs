use std::any::Any;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use crate::observable::KvoObject;
use crate::observer_set::{ContextToken, ObserverTarget};
use crate::path::{Path, PathRoot};
use crate::revision::Revision;
use crate::value::PropertyValue;

/// The capability a chain-observable node exposes: everything
/// [`KvoObject`] already gives, plus the ability to resolve the next node
/// along a dotted path. Concrete types implement `node_get`/
/// `node_add_observer`/`node_remove_observer` by delegating to their own
/// `Observable` impl (see spec §9: "capability union" for dynamic
/// dispatch across an object graph).
pub trait GraphNode: KvoObject {
    fn node_get(&mut self, key: &str) -> PropertyValue;
    fn node_add_observer(
        &mut self,
        key: &str,
        target: Arc<dyn ObserverTarget>,
        method: Arc<str>,
        context: Option<ContextToken>,
    );
    fn node_remove_observer(&mut self, key: &str, target: &Arc<dyn ObserverTarget>, method: &str);

    /// Reads `key` and, if it resolves to a nested node (spec: "the
    /// intermediate value... becomes defined"), returns a handle to it.
    fn resolve_child(&mut self, key: &str) -> Option<Rc<RefCell<dyn GraphNode>>>;
}

fn node_identity(node: &Rc<RefCell<dyn GraphNode>>) -> usize {
    Rc::as_ptr(node) as *const () as usize
}

const CHAIN_METHOD: &str = "__chain_segment_changed";

/// One node of a chained-path observer, responsible for a single segment
/// of the path (spec §4.C). Terminal nodes invoke the `master`
/// target/method directly; interior nodes rebuild their child whenever the
/// intermediate object they observe is replaced.
pub struct ChainObserverNode {
    root: Weak<RefCell<dyn GraphNode>>,
    segment: Arc<str>,
    rest: Vec<Arc<str>>,
    child: RefCell<Option<Rc<RefCell<ChainObserverNode>>>>,
    master_target: Arc<dyn ObserverTarget>,
    master_method: Arc<str>,
    master_context: Option<ContextToken>,
    cached_value: RefCell<PropertyValue>,
    /// The root identity and exact `Arc` handle this node registered itself
    /// with, kept so `destroy` can remove the *same* `Arc` pointer it added
    /// — `ObserverSet` keys removal by `Arc::as_ptr` identity, so a
    /// freshly-allocated lookalike `Arc` would never match.
    installed: RefCell<Option<(usize, Arc<dyn ObserverTarget>)>>,
}

/// Thin `Arc<dyn ObserverTarget>` wrapper so a node can register itself as
/// an observer of its own segment without exposing its interior mutability
/// to callers.
struct ChainHandle(Rc<RefCell<ChainObserverNode>>);

impl ObserverTarget for ChainHandle {
    fn notify(&self, _source: &dyn Any, _key: &str, _revision: Revision, _context: Option<ContextToken>) {
        ChainObserverNode::handle_segment_changed(&self.0);
    }
}

impl ChainObserverNode {
    fn new_chain(
        root: Weak<RefCell<dyn GraphNode>>,
        segments: &[Arc<str>],
        master_target: Arc<dyn ObserverTarget>,
        master_method: Arc<str>,
        master_context: Option<ContextToken>,
    ) -> Rc<RefCell<ChainObserverNode>> {
        let node = Rc::new(RefCell::new(ChainObserverNode {
            root,
            segment: segments[0].clone(),
            rest: segments[1..].to_vec(),
            child: RefCell::new(None),
            master_target,
            master_method,
            master_context,
            cached_value: RefCell::new(PropertyValue::Undefined),
            installed: RefCell::new(None),
        }));
        ChainObserverNode::connect(&node);
        node
    }

    fn is_terminal(&self) -> bool {
        self.rest.is_empty()
    }

    fn connect(self_rc: &Rc<RefCell<ChainObserverNode>>) {
        let root = {
            let node = self_rc.borrow();
            node.root.upgrade()
        };
        let root = match root {
            Some(r) => r,
            None => return,
        };
        let id = node_identity(&root);
        let (segment, already) = {
            let node = self_rc.borrow();
            let matches = matches!(&*node.installed.borrow(), Some((installed_id, _)) if *installed_id == id);
            (node.segment.clone(), matches)
        };
        if !already {
            let handle: Arc<dyn ObserverTarget> = Arc::new(ChainHandle(self_rc.clone()));
            root.borrow_mut().node_add_observer(&segment, handle.clone(), Arc::from(CHAIN_METHOD), None);
            *self_rc.borrow().installed.borrow_mut() = Some((id, handle));
        }
        let value = root.borrow_mut().node_get(&segment);
        self_rc.borrow().cached_value.replace(value.clone());
        if !self_rc.borrow().is_terminal() {
            ChainObserverNode::rewire_child(self_rc, value);
        }
    }

    fn rewire_child(self_rc: &Rc<RefCell<ChainObserverNode>>, value: PropertyValue) {
        ChainObserverNode::disconnect_child(self_rc);
        let next_root = match &value {
            PropertyValue::Object(handle) => Rc::downgrade(handle),
            _ => return, // intermediate value undefined; chain pauses here
        };
        let (rest, master_target, master_method, master_context) = {
            let node = self_rc.borrow();
            (
                node.rest.clone(),
                node.master_target.clone(),
                node.master_method.clone(),
                node.master_context,
            )
        };
        let child = ChainObserverNode::new_chain(next_root, &rest, master_target, master_method, master_context);
        *self_rc.borrow().child.borrow_mut() = Some(child);
    }

    fn disconnect_child(self_rc: &Rc<RefCell<ChainObserverNode>>) {
        let existing = self_rc.borrow().child.borrow_mut().take();
        if let Some(child) = existing {
            ChainObserverNode::destroy(&child);
        }
    }

    fn handle_segment_changed(self_rc: &Rc<RefCell<ChainObserverNode>>) {
        let root = self_rc.borrow().root.upgrade();
        let root = match root {
            Some(r) => r,
            None => return,
        };
        let segment = self_rc.borrow().segment.clone();
        let value = root.borrow_mut().node_get(&segment);
        let unchanged = *self_rc.borrow().cached_value.borrow() == value;
        if unchanged {
            return;
        }
        self_rc.borrow().cached_value.replace(value.clone());

        if self_rc.borrow().is_terminal() {
            let (target, segment, context) = {
                let node = self_rc.borrow();
                (node.master_target.clone(), node.segment.clone(), node.master_context)
            };
            target.notify(&value as &dyn Any, &segment, Revision::default(), context);
        } else {
            ChainObserverNode::rewire_child(self_rc, value);
        }
    }

    /// Tears down the KVO hookups this node (and its descendants)
    /// installed.
    fn destroy(self_rc: &Rc<RefCell<ChainObserverNode>>) {
        ChainObserverNode::disconnect_child(self_rc);
        if let Some(root) = self_rc.borrow().root.upgrade() {
            let id = node_identity(&root);
            let handle = match self_rc.borrow().installed.borrow_mut().take() {
                Some((installed_id, handle)) if installed_id == id => Some(handle),
                other => {
                    // Belongs to a stale root (or was never installed) —
                    // put it back untouched rather than silently dropping
                    // bookkeeping for a root we didn't touch.
                    *self_rc.borrow().installed.borrow_mut() = other;
                    None
                }
            };
            if let Some(handle) = handle {
                let segment = self_rc.borrow().segment.clone();
                root.borrow_mut().node_remove_observer(&segment, &handle, CHAIN_METHOD);
            }
        }
    }
}

/// Public handle to a chained-path observation; `destroy_chain` tears down
/// every hookup it installed along the path.
pub struct ChainObserver {
    head: Rc<RefCell<ChainObserverNode>>,
}

impl ChainObserver {
    /// Installs an observer on `path`, rooted at `root`. `path` must not be
    /// [`PathRoot::Global`] with an unresolved name — callers resolve
    /// globals through [`ObservationContext::add_observer`] before
    /// constructing a `ChainObserver` directly.
    pub fn install(
        root: Weak<RefCell<dyn GraphNode>>,
        path: &Path,
        target: Arc<dyn ObserverTarget>,
        method: Arc<str>,
        context: Option<ContextToken>,
    ) -> ChainObserver {
        debug_assert_ne!(path.root, PathRoot::Global, "global root must already be resolved");
        let head = ChainObserverNode::new_chain(root, &path.segments, target, method, context);
        ChainObserver { head }
    }

    pub fn destroy_chain(self) {
        ChainObserverNode::destroy(&self.head);
    }
}
