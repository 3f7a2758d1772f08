//! Per-request context.
//!
//! A [`Context`] is a mutable key/value bag owned by the call site of one logical
//! request. Every context-bound point copy references it. Besides user values it keeps
//! the private hook registry of the request, the streaming flags and the queue of sends
//! deferred until the caller has finished registering hooks.

use crate::chain::PointId;
use crate::error::{PipelineError, Result};
use crate::handler::Handler;
use crate::hook::Hook;
use crate::message::{Exchange, HookKind};
use crate::point::Deferred;
use std::any::Any;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::rc::Rc;

/// Keys starting with this prefix are control keys and never inherited by nested contexts.
pub const RESERVED_PREFIX: char = '$';

/// Returns `true` if `key` is a reserved control key.
pub fn is_reserved(key: &str) -> bool {
    key.starts_with(RESERVED_PREFIX)
}

/// Copies every entry of `source` missing from `target`, skipping keys matched by `exclude`.
pub(crate) fn merge_missing<V: Clone>(
    target: &mut HashMap<String, V>,
    source: &HashMap<String, V>,
    exclude: impl Fn(&str) -> bool,
) {
    for (key, value) in source {
        if exclude(key) || target.contains_key(key) {
            continue;
        }
        target.insert(key.clone(), value.clone());
    }
}

struct Registration<X: Exchange> {
    hook: Hook<X>,
    once: bool,
}

struct ContextState<X: Exchange> {
    values: HashMap<String, Rc<dyn Any>>,
    transport: Option<Rc<dyn Handler<X>>>,
    hooks: HashMap<PointId, HashMap<HookKind, Registration<X>>>,
    request_stream: bool,
    response_stream: bool,
    deferred: VecDeque<Deferred<X>>,
}

/// Shared handle to the state of one logical request.
///
/// Cloning the handle does not copy the state; all clones see the same values and hooks.
///
/// ```rust
/// use pipepoint::{Context, Exchange};
///
/// # struct Text;
/// # impl Exchange for Text {
/// #     type Request = String;
/// #     type Response = String;
/// #     type Error = String;
/// # }
/// let ctx = Context::<Text>::new();
/// ctx.insert("tenant", "acme".to_owned());
/// assert_eq!(ctx.get::<String>("tenant").as_deref().map(String::as_str), Some("acme"));
/// ```
pub struct Context<X: Exchange> {
    inner: Rc<RefCell<ContextState<X>>>,
}

impl<X: Exchange> Context<X> {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(ContextState {
                values: HashMap::new(),
                transport: None,
                hooks: HashMap::new(),
                request_stream: false,
                response_stream: false,
                deferred: VecDeque::new(),
            })),
        }
    }

    /// Stores `value` under `key`, returning the previous value.
    pub fn insert<T: Any>(&self, key: impl Into<String>, value: T) -> Option<Rc<dyn Any>> {
        self.insert_shared(key, Rc::new(value))
    }

    /// Stores an already shared value under `key`, returning the previous value.
    pub fn insert_shared(
        &self,
        key: impl Into<String>,
        value: Rc<dyn Any>,
    ) -> Option<Rc<dyn Any>> {
        self.inner.borrow_mut().values.insert(key.into(), value)
    }

    /// Returns the value under `key` if it exists and has type `T`.
    pub fn get<T: Any>(&self, key: &str) -> Option<Rc<T>> {
        let value = self.inner.borrow().values.get(key).cloned()?;
        value.downcast::<T>().ok()
    }

    /// Returns `true` if a value is stored under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.inner.borrow().values.contains_key(key)
    }

    /// Removes and returns the value under `key`.
    pub fn remove(&self, key: &str) -> Option<Rc<dyn Any>> {
        self.inner.borrow_mut().values.remove(key)
    }

    /// Returns the stored keys in no particular order.
    pub fn keys(&self) -> Vec<String> {
        self.inner.borrow().values.keys().cloned().collect()
    }

    /// Overrides the pipeline transport for requests using this context.
    pub fn set_transport(&self, transport: impl Handler<X> + 'static) {
        self.inner.borrow_mut().transport = Some(Rc::new(transport));
    }

    /// Returns the per-context transport override, if any.
    pub fn transport(&self) -> Option<Rc<dyn Handler<X>>> {
        self.inner.borrow().transport.clone()
    }

    /// Returns `true` once a request stream was started with this context.
    pub fn is_request_stream(&self) -> bool {
        self.inner.borrow().request_stream
    }

    /// Returns `true` once a response stream was started with this context.
    pub fn is_response_stream(&self) -> bool {
        self.inner.borrow().response_stream
    }

    /// Returns `true` if both handles refer to the same context.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn set_request_stream(&self) {
        self.inner.borrow_mut().request_stream = true;
    }

    pub(crate) fn set_response_stream(&self) {
        self.inner.borrow_mut().response_stream = true;
    }

    /// Copies the inheritable part of `parent` into this context.
    ///
    /// User values and the transport override are copied unless already present here;
    /// reserved keys are skipped.
    pub(crate) fn inherit(&self, parent: &Context<X>) {
        if self.ptr_eq(parent) {
            return;
        }
        let parent = parent.inner.borrow();
        let mut state = self.inner.borrow_mut();
        merge_missing(&mut state.values, &parent.values, is_reserved);
        if state.transport.is_none() {
            state.transport = parent.transport.clone();
        }
    }

    pub(crate) fn reset_hooks(&self) {
        self.inner.borrow_mut().hooks.clear();
    }

    pub(crate) fn register(&self, id: PointId, hook: Hook<X>, once: bool) -> Result<(), X::Error> {
        let kind = hook.kind();
        let mut state = self.inner.borrow_mut();
        let hooks = state.hooks.entry(id).or_default();
        if hooks.contains_key(&kind) {
            return Err(PipelineError::DuplicateHook(kind));
        }
        hooks.insert(kind, Registration { hook, once });
        Ok(())
    }

    /// Looks up the hook for `kind` at `id`, deregistering it if it was registered once.
    pub(crate) fn take_hook(&self, id: PointId, kind: HookKind) -> Option<Hook<X>> {
        let mut state = self.inner.borrow_mut();
        let hooks = state.hooks.get_mut(&id)?;
        if hooks.get(&kind)?.once {
            hooks.remove(&kind).map(|registration| registration.hook)
        } else {
            hooks.get(&kind).map(|registration| registration.hook.clone())
        }
    }

    /// Returns `true` if a hook for `kind` is registered at `id`.
    pub fn has_hook(&self, id: PointId, kind: HookKind) -> bool {
        self.inner
            .borrow()
            .hooks
            .get(&id)
            .is_some_and(|hooks| hooks.contains_key(&kind))
    }

    pub(crate) fn defer(&self, deferred: Deferred<X>) {
        self.inner.borrow_mut().deferred.push_back(deferred);
    }

    pub(crate) fn pop_deferred(&self) -> Option<Deferred<X>> {
        self.inner.borrow_mut().deferred.pop_front()
    }

    /// Number of sends waiting for [`Point::flush`](crate::Point::flush).
    pub fn pending(&self) -> usize {
        self.inner.borrow().deferred.len()
    }
}

impl<X: Exchange> Clone for Context<X> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<X: Exchange> Default for Context<X> {
    fn default() -> Self {
        Self::new()
    }
}

impl<X: Exchange> fmt::Debug for Context<X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.borrow();
        f.debug_struct("Context")
            .field("keys", &state.values.keys().collect::<Vec<_>>())
            .field("transport", &state.transport.is_some())
            .field("hooked_points", &state.hooks.len())
            .field("request_stream", &state.request_stream)
            .field("response_stream", &state.response_stream)
            .field("pending", &state.deferred.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Text;

    impl Exchange for Text {
        type Request = String;
        type Response = String;
        type Error = String;
    }

    #[test]
    fn merge_skips_excluded_and_present_keys() {
        let mut target: HashMap<String, u32> = HashMap::from([("a".to_owned(), 1)]);
        let source = HashMap::from([
            ("a".to_owned(), 10),
            ("b".to_owned(), 20),
            ("$c".to_owned(), 30),
        ]);

        merge_missing(&mut target, &source, is_reserved);

        assert_eq!(target.get("a"), Some(&1));
        assert_eq!(target.get("b"), Some(&20));
        assert!(!target.contains_key("$c"));
    }

    #[test]
    fn inherit_shares_values_but_not_hooks() {
        let parent = Context::<Text>::new();
        parent.insert("user", "bob".to_owned());
        parent.insert("$secret", 42u32);
        parent
            .register(PointId::next(), Hook::request(|req, next| next.resume(req)), false)
            .unwrap();

        let child = Context::<Text>::new();
        child.inherit(&parent);

        assert_eq!(child.get::<String>("user").as_deref(), Some(&"bob".to_owned()));
        assert!(!child.contains("$secret"));
        assert!(child.inner.borrow().hooks.is_empty());
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let ctx = Context::<Text>::new();
        let id = PointId::next();
        ctx.register(id, Hook::response(|res, next| next.resume(res)), false)
            .unwrap();
        let err = ctx
            .register(id, Hook::response(|res, next| next.resume(res)), true)
            .unwrap_err();
        assert!(matches!(err, PipelineError::DuplicateHook(HookKind::Response)));
        // other points are unaffected
        ctx.register(PointId::next(), Hook::response(|res, next| next.resume(res)), false)
            .unwrap();
    }

    #[test]
    fn once_hooks_are_taken_out() {
        let ctx = Context::<Text>::new();
        let id = PointId::next();
        ctx.register(id, Hook::error(|err, next| next.resume(err)), true)
            .unwrap();
        ctx.register(id, Hook::request(|req, next| next.resume(req)), false)
            .unwrap();

        assert!(ctx.take_hook(id, HookKind::Error).is_some());
        assert!(ctx.take_hook(id, HookKind::Error).is_none());
        assert!(ctx.take_hook(id, HookKind::Request).is_some());
        assert!(ctx.take_hook(id, HookKind::Request).is_some());
        assert!(ctx.has_hook(id, HookKind::Request));
    }

    #[test]
    fn get_with_wrong_type_is_none() {
        let ctx = Context::<Text>::new();
        ctx.insert("n", 7u64);
        assert!(ctx.get::<String>("n").is_none());
        assert_eq!(ctx.get::<u64>("n").as_deref(), Some(&7));
    }
}
