//! The single loaded unit shared by both roles.
//!
//! The same script is evaluated in the root context and in the background
//! context; its context name decides what it does.

use crate::analysis::EngineFactory;
use crate::handshake::background_thread_start;
use crate::threads::{self, Script};

/// Name given to the background context.
pub const BACKGROUND_THREAD_NAME: &str = "twinlsp-background";

/// URL the entry script is known by.
pub const ENTRY_SCRIPT_URL: &str = "twinlsp://entry";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Foreground,
    Background,
}

impl Role {
    pub fn select(context_name: &str, background_name: &str) -> Self {
        if context_name == background_name {
            Role::Background
        } else {
            Role::Foreground
        }
    }

    /// Role of the calling context, recorded in the threading globals.
    pub fn current(background_name: &str) -> Self {
        let role = Self::select(&threads::thread_id(), background_name);
        threads::set_is_main_thread(role == Role::Foreground);
        role
    }
}

/// Build the entry script.
///
/// Evaluated in a context named `background_name` it starts the background
/// role. The foreground role is driven by the root context itself, so
/// evaluating it anywhere else only logs.
pub fn entry_script(background_name: impl Into<String>, engines: EngineFactory) -> Script {
    let background_name = background_name.into();
    Script::new(ENTRY_SCRIPT_URL, move |scope| {
        match Role::select(scope.name(), &background_name) {
            Role::Background => background_thread_start(&scope, engines.clone()),
            Role::Foreground => {
                threads::set_is_main_thread(true);
                tracing::warn!(
                    context = scope.name(),
                    "entry script evaluated in an unexpected context; nothing to run"
                );
            }
        }
    })
}
