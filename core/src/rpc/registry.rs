//! Module registry and request dispatch
//!
//! Modules are attached to a [`ModuleRegistry`] during startup. Before the
//! accept loop starts the registry is frozen into a [`ModuleSet`], which is
//! shared read-only by every session.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use log::*;
use thiserror::Error;

use super::module::Module;
use super::types::{RpcRequest, RpcResponse};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("command {command} registered twice on module {module}")]
    DuplicateCommand { module: String, command: String },

    #[error("module name {0} is reserved for connection control")]
    ReservedModuleName(String),
}

/// Attach-only collection of modules, in attach order
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    modules: Vec<Module>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a module. Returns false (and changes nothing) if a module with
    /// the same name is already attached.
    pub fn attach(&mut self, module: Module) -> bool {
        if self.contains(module.name()) {
            debug!("Module {} already attached, ignoring", module.name());
            return false;
        }
        debug!(
            "Attached module {} with commands: {}",
            module.name(),
            module.command_names().join(", ")
        );
        self.modules.push(module);
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.iter().any(|m| m.name() == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.modules.iter().map(|m| m.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Freezes the registry into an immutable snapshot
    pub fn finalize(self) -> Arc<ModuleSet> {
        let order = self.names();
        let modules = self
            .modules
            .into_iter()
            .map(|m| (m.name().to_string(), m))
            .collect();
        Arc::new(ModuleSet { order, modules })
    }
}

/// Immutable set of attached modules
#[derive(Debug, Default)]
pub struct ModuleSet {
    order: Vec<String>,
    modules: HashMap<String, Module>,
}

impl ModuleSet {
    /// Module names in attach order
    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn get(&self, name: &str) -> Option<&Module> {
        self.modules.get(name)
    }

    /// Routes a request to its module and command and wraps the outcome
    pub fn dispatch(&self, request: &RpcRequest) -> RpcResponse {
        let Some(module) = self.get(&request.module) else {
            debug!("Request for unknown module {}", request.module);
            return RpcResponse::unknown_module(&request.module);
        };
        let Some(command) = module.remote_command(&request.command) else {
            debug!(
                "Request for unknown or non-invocable command {}.{}",
                request.module, request.command
            );
            return RpcResponse::unknown_command(&request.module, &request.command);
        };

        match panic::catch_unwind(AssertUnwindSafe(|| command.invoke(request.arguments()))) {
            Ok(Ok(result)) => RpcResponse::success(result),
            Ok(Err(e)) => {
                debug!("{}.{} failed: {}", request.module, request.command, e);
                RpcResponse::failure(format!("{}.{}: {}", request.module, request.command, e))
            }
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                error!(
                    "{}.{} panicked: {}",
                    request.module, request.command, reason
                );
                RpcResponse::failure(format!(
                    "{}.{} panicked: {}",
                    request.module, request.command, reason
                ))
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
