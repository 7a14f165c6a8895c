//! Background side of the startup handshake.

use std::cell::RefCell;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{ControlMessage, HandshakeResult, InitializationData};
use crate::analysis::{BackgroundAnalysisRunner, EngineFactory};
use crate::host::NoAccessHost;
use crate::threads::{self, Flow, GlobalScope, ListenerId, Value};

thread_local! {
    // Keeps the runner alive for the lifetime of the context.
    static RUNNER: RefCell<Option<Arc<BackgroundAnalysisRunner>>> = const { RefCell::new(None) };
}

/// Entry point of the background role. Runs synchronously while the entry
/// script is evaluated.
///
/// Registers a one-shot listener for the worker data, then announces that
/// the context has started.
pub fn background_thread_start(scope: &GlobalScope, engines: EngineFactory) {
    threads::set_is_main_thread(false);

    let slot: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));
    let listener_slot = slot.clone();
    let listener_scope = scope.clone();

    let id = scope.add_listener(Arc::new(move |event| {
        let Some(ControlMessage::InitialWorkerData { worker_data }) = ControlMessage::parse(&event.data)
        else {
            return Flow::Continue;
        };

        match initialize(worker_data, &engines) {
            Ok(runner) => {
                RUNNER.with(|slot| *slot.borrow_mut() = Some(runner));
                announce(ControlMessage::BackgroundWorkerInitialized);
            }
            Err(e) => tracing::error!(error = %e, "background initialization failed"),
        }

        if let Some(id) = listener_slot.lock().take() {
            listener_scope.remove_listener(id);
        }
        Flow::Stop
    }));
    *slot.lock() = Some(id);

    tracing::debug!(context = scope.name(), "background context loaded");
    announce(ControlMessage::BackgroundWorkerStarted);
}

fn initialize(
    worker_data: InitializationData,
    engines: &EngineFactory,
) -> HandshakeResult<Arc<BackgroundAnalysisRunner>> {
    threads::set_worker_data(Value::from_serialize(&worker_data)?)?;

    let runner = Arc::new(BackgroundAnalysisRunner::new(engines(), Arc::new(NoAccessHost))?);
    runner.start();
    tracing::debug!(worker_index = worker_data.worker_index, "background runner started");
    Ok(runner)
}

fn announce(message: ControlMessage) {
    let Some(port) = threads::parent_port() else {
        tracing::error!("background role started outside of a child context");
        return;
    };
    let sent = message
        .to_value()
        .map_err(threads::ThreadsError::from)
        .and_then(|value| port.post_message(value, None));
    if let Err(e) = sent {
        tracing::error!(error = %e, "failed to post handshake message");
    }
}
