// src/exec/registry.rs

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::errors::{Result, TrellisError};
use crate::exec::exec_handler::ExecHandler;
use crate::exec::handler::ActionTypeHandler;
use crate::types::ActionKind;

/// Handlers keyed by `(kind, type)`.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<(ActionKind, String), Arc<dyn ActionTypeHandler>>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<String> = self
            .handlers
            .keys()
            .map(|(kind, ty)| format!("{kind}/{ty}"))
            .collect();
        keys.sort();
        f.debug_struct("HandlerRegistry")
            .field("handlers", &keys)
            .finish()
    }
}

impl HandlerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in `exec` handler for every kind.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for kind in ActionKind::ALL {
            registry.register(Arc::new(ExecHandler::new(kind)));
        }
        registry
    }

    /// Register a handler; an existing handler for the same pair is replaced.
    pub fn register(&mut self, handler: Arc<dyn ActionTypeHandler>) {
        let key = (handler.kind(), handler.type_name().to_string());
        if self.handlers.contains_key(&key) {
            warn!(kind = %key.0, type_name = %key.1, "replacing registered handler");
        } else {
            debug!(kind = %key.0, type_name = %key.1, "registered handler");
        }
        self.handlers.insert(key, handler);
    }

    pub fn get(&self, kind: ActionKind, type_name: &str) -> Result<Arc<dyn ActionTypeHandler>> {
        self.handlers
            .get(&(kind, type_name.to_string()))
            .cloned()
            .ok_or_else(|| TrellisError::HandlerNotFound {
                kind: kind.to_string(),
                type_name: type_name.to_string(),
            })
    }

    pub fn contains(&self, kind: ActionKind, type_name: &str) -> bool {
        self.handlers.contains_key(&(kind, type_name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_cover_every_kind() {
        let registry = HandlerRegistry::with_builtins();
        for kind in ActionKind::ALL {
            assert!(registry.contains(kind, "exec"));
        }
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn unknown_pair_is_handler_not_found() {
        let registry = HandlerRegistry::with_builtins();
        match registry.get(ActionKind::Deploy, "helm") {
            Err(TrellisError::HandlerNotFound { kind, type_name }) => {
                assert_eq!(kind, "deploy");
                assert_eq!(type_name, "helm");
            }
            Err(other) => panic!("unexpected error {other:?}"),
            Ok(_) => panic!("expected an error"),
        }
    }

    #[test]
    fn registering_twice_replaces() {
        let mut registry = HandlerRegistry::new();
        registry.register(Arc::new(ExecHandler::new(ActionKind::Run)));
        registry.register(Arc::new(ExecHandler::new(ActionKind::Run)));
        assert_eq!(registry.len(), 1);
    }
}
