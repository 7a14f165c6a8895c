//! Context-wide threading globals.
//!
//! Every execution context runs on its own OS thread, so these live in
//! thread-local storage and play the role of process-wide state inside one
//! context.

use std::cell::RefCell;

use super::native::GlobalScope;
use super::port::MessagePort;
use super::value::Value;
use super::{ThreadsError, ThreadsResult};

#[derive(Default)]
struct ContextState {
    scope: Option<GlobalScope>,
    is_main_thread: Option<bool>,
    worker_data: Option<Value>,
}

thread_local! {
    static CONTEXT: RefCell<ContextState> = RefCell::new(ContextState::default());
}

pub(crate) fn enter_child(scope: GlobalScope) {
    CONTEXT.with(|state| {
        *state.borrow_mut() = ContextState {
            scope: Some(scope),
            ..ContextState::default()
        }
    });
}

/// Name of the current context. Empty in the root context.
pub fn thread_id() -> String {
    CONTEXT.with(|state| {
        state
            .borrow()
            .scope
            .as_ref()
            .map(|scope| scope.name().to_string())
            .unwrap_or_default()
    })
}

/// Whether this context plays the main (foreground) role.
///
/// Falls back to "is this the root context" until [`set_is_main_thread`]
/// has been called.
pub fn is_main_thread() -> bool {
    CONTEXT.with(|state| {
        let state = state.borrow();
        state.is_main_thread.unwrap_or(state.scope.is_none())
    })
}

/// Record the role of this context. Call early in context startup.
pub fn set_is_main_thread(value: bool) {
    CONTEXT.with(|state| state.borrow_mut().is_main_thread = Some(value));
}

/// Port to the parent context, when running inside a child context.
pub fn parent_port() -> Option<MessagePort> {
    CONTEXT.with(|state| state.borrow().scope.clone().map(MessagePort::new))
}

/// Data delivered to this context at startup, if any.
pub fn worker_data() -> Option<Value> {
    CONTEXT.with(|state| state.borrow().worker_data.clone())
}

/// Store the startup data for this context. Can be set once.
pub fn set_worker_data(data: Value) -> ThreadsResult<()> {
    CONTEXT.with(|state| {
        let mut state = state.borrow_mut();
        if state.worker_data.is_some() {
            return Err(ThreadsError::WorkerDataAlreadySet);
        }
        state.worker_data = Some(data);
        Ok(())
    })
}
