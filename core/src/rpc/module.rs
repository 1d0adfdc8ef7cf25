//! Modules and the commands they expose
//!
//! A module is built once with [`ModuleBuilder`]; only commands registered
//! through [`ModuleBuilder::command`] or [`ModuleBuilder::variadic`] are
//! reachable from the wire. [`ModuleBuilder::internal`] commands can only be
//! invoked in-process.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;

use super::registry::RegistryError;
use super::types::{CONTROL_MODULE, RpcResult};

/// Errors raised while binding arguments or running a command handler
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("expected {expected} argument(s), got {got}")]
    Arity { expected: usize, got: usize },

    #[error("expected at least {minimum} argument(s), got {got}")]
    TooFewArguments { minimum: usize, got: usize },

    #[error("argument {index} is missing")]
    MissingArgument { index: usize },

    #[error("argument {index} ({value:?}) is invalid: {reason}")]
    InvalidArgument {
        index: usize,
        value: String,
        reason: String,
    },

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("{0}")]
    Failed(String),
}

impl CommandError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Whether a command is reachable from the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exposure {
    Remote,
    Internal,
}

/// Parameter shape of a command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signature {
    params: Vec<&'static str>,
    variadic: Option<&'static str>,
}

impl Signature {
    pub fn new(params: &[&'static str]) -> Self {
        Self {
            params: params.to_vec(),
            variadic: None,
        }
    }

    /// Leading positional parameters followed by a trailing parameter that
    /// collects all remaining arguments
    pub fn variadic(leading: &[&'static str], tail: &'static str) -> Self {
        Self {
            params: leading.to_vec(),
            variadic: Some(tail),
        }
    }

    /// Number of positional parameters
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn is_variadic(&self) -> bool {
        self.variadic.is_some()
    }

    pub fn bind(&self, args: &[String]) -> Result<Arguments, CommandError> {
        let arity = self.arity();
        if self.is_variadic() {
            if args.len() < arity {
                return Err(CommandError::TooFewArguments {
                    minimum: arity,
                    got: args.len(),
                });
            }
        } else if args.len() != arity {
            return Err(CommandError::Arity {
                expected: arity,
                got: args.len(),
            });
        }

        let (positional, rest) = args.split_at(arity);
        Ok(Arguments {
            positional: positional.to_vec(),
            rest: rest.to_vec(),
        })
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = self.params.iter().map(|p| p.to_string()).collect();
        if let Some(tail) = self.variadic {
            parts.push(format!("{}...", tail));
        }
        write!(f, "({})", parts.join(", "))
    }
}

/// Arguments bound to a command's signature
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Arguments {
    positional: Vec<String>,
    rest: Vec<String>,
}

impl Arguments {
    pub fn str(&self, index: usize) -> Result<&str, CommandError> {
        self.positional
            .get(index)
            .map(String::as_str)
            .ok_or(CommandError::MissingArgument { index })
    }

    /// Parses the positional argument at `index`
    pub fn get<T>(&self, index: usize) -> Result<T, CommandError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        let value = self.str(index)?;
        value
            .trim()
            .parse()
            .map_err(|e: T::Err| CommandError::InvalidArgument {
                index,
                value: value.to_string(),
                reason: e.to_string(),
            })
    }

    /// Values packed into the trailing variadic parameter
    pub fn rest(&self) -> &[String] {
        &self.rest
    }

    pub fn len(&self) -> usize {
        self.positional.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty()
    }
}

pub type Handler = Arc<dyn Fn(&Arguments) -> Result<RpcResult, CommandError> + Send + Sync>;

/// A single named operation of a module
#[derive(Clone)]
pub struct Command {
    name: String,
    signature: Signature,
    exposure: Exposure,
    handler: Handler,
}

impl Command {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn exposure(&self) -> Exposure {
        self.exposure
    }

    pub fn is_invocable(&self) -> bool {
        self.exposure == Exposure::Remote
    }

    /// Binds `args` to the signature and runs the handler
    pub fn invoke(&self, args: &[String]) -> Result<RpcResult, CommandError> {
        let bound = self.signature.bind(args)?;
        (self.handler)(&bound)
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .field("exposure", &self.exposure)
            .finish_non_exhaustive()
    }
}

/// A named group of commands
#[derive(Clone, Debug)]
pub struct Module {
    name: String,
    commands: HashMap<String, Command>,
}

impl Module {
    pub fn builder(name: impl Into<String>) -> ModuleBuilder {
        ModuleBuilder {
            name: name.into(),
            commands: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks up any command, including internal ones
    pub fn command(&self, name: &str) -> Option<&Command> {
        self.commands.get(name)
    }

    /// Looks up a command reachable from the wire
    pub fn remote_command(&self, name: &str) -> Option<&Command> {
        self.command(name).filter(|c| c.is_invocable())
    }

    /// Sorted names of the remotely invocable commands
    pub fn command_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .commands
            .values()
            .filter(|c| c.is_invocable())
            .map(Command::name)
            .collect();
        names.sort_unstable();
        names
    }

    /// Runs a command in-process, regardless of its exposure
    pub fn invoke_local(&self, command: &str, args: &[String]) -> Result<RpcResult, CommandError> {
        self.command(command)
            .ok_or_else(|| CommandError::UnknownCommand(format!("{}.{}", self.name, command)))?
            .invoke(args)
    }
}

/// Assembles the allow-list of a [`Module`]
pub struct ModuleBuilder {
    name: String,
    commands: Vec<Command>,
}

impl ModuleBuilder {
    /// Registers a remotely invocable command with positional parameters
    pub fn command<F, R>(self, name: &str, params: &[&'static str], handler: F) -> Self
    where
        F: Fn(&Arguments) -> Result<R, CommandError> + Send + Sync + 'static,
        R: Into<RpcResult>,
    {
        self.register(name, Signature::new(params), Exposure::Remote, handler)
    }

    /// Registers a remotely invocable command with a trailing variadic parameter
    pub fn variadic<F, R>(
        self,
        name: &str,
        leading: &[&'static str],
        tail: &'static str,
        handler: F,
    ) -> Self
    where
        F: Fn(&Arguments) -> Result<R, CommandError> + Send + Sync + 'static,
        R: Into<RpcResult>,
    {
        self.register(
            name,
            Signature::variadic(leading, tail),
            Exposure::Remote,
            handler,
        )
    }

    /// Registers a command that is only callable through [`Module::invoke_local`]
    pub fn internal<F, R>(self, name: &str, params: &[&'static str], handler: F) -> Self
    where
        F: Fn(&Arguments) -> Result<R, CommandError> + Send + Sync + 'static,
        R: Into<RpcResult>,
    {
        self.register(name, Signature::new(params), Exposure::Internal, handler)
    }

    fn register<F, R>(
        mut self,
        name: &str,
        signature: Signature,
        exposure: Exposure,
        handler: F,
    ) -> Self
    where
        F: Fn(&Arguments) -> Result<R, CommandError> + Send + Sync + 'static,
        R: Into<RpcResult>,
    {
        let handler: Handler =
            Arc::new(move |args: &Arguments| handler(args).map(Into::<RpcResult>::into));
        self.commands.push(Command {
            name: name.to_string(),
            signature,
            exposure,
            handler,
        });
        self
    }

    pub fn build(self) -> Result<Module, RegistryError> {
        if self.name == CONTROL_MODULE {
            return Err(RegistryError::ReservedModuleName(self.name));
        }

        let mut commands = HashMap::with_capacity(self.commands.len());
        for command in self.commands {
            if commands.contains_key(&command.name) {
                return Err(RegistryError::DuplicateCommand {
                    module: self.name,
                    command: command.name,
                });
            }
            commands.insert(command.name.clone(), command);
        }

        Ok(Module {
            name: self.name,
            commands,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn test_module() -> Module {
        Module::builder("Playback")
            .variadic("Play", &[], "uris", |args| Ok(args.rest().join("|")))
            .command("SetVolume", &["volume"], |args| {
                let volume: u8 = args.get(0)?;
                Ok(u32::from(volume) * 2)
            })
            .variadic("Seek", &["track"], "offsets", |args| {
                Ok(format!("{}:{}", args.str(0)?, args.rest().len()))
            })
            .internal("Reset", &[], |_| Ok(()))
            .build()
            .unwrap()
    }

    #[test]
    fn test_variadic_keeps_order() {
        let module = test_module();
        let result = module
            .invoke_local("Play", &strings(&["a.mp3", "b.mp3", "c.mp3"]))
            .unwrap();
        assert_eq!(result, RpcResult::Text("a.mp3|b.mp3|c.mp3".into()));

        // Zero values is a valid variadic call
        let result = module.invoke_local("Play", &[]).unwrap();
        assert_eq!(result, RpcResult::Text(String::new()));
    }

    #[test]
    fn test_leading_params_before_variadic() {
        let module = test_module();
        let result = module
            .invoke_local("Seek", &strings(&["3", "10", "20"]))
            .unwrap();
        assert_eq!(result, RpcResult::Text("3:2".into()));

        assert_eq!(
            module.invoke_local("Seek", &[]),
            Err(CommandError::TooFewArguments { minimum: 1, got: 0 })
        );
    }

    #[test]
    fn test_arity_mismatch() {
        let module = test_module();
        assert_eq!(
            module.invoke_local("SetVolume", &strings(&["1", "2"])),
            Err(CommandError::Arity {
                expected: 1,
                got: 2
            })
        );
        assert_eq!(
            module.invoke_local("Reset", &strings(&["x"])),
            Err(CommandError::Arity {
                expected: 0,
                got: 1
            })
        );
    }

    #[test]
    fn test_argument_parsing() {
        let module = test_module();
        assert_eq!(
            module.invoke_local("SetVolume", &strings(&["21"])),
            Ok(RpcResult::Number(42.0))
        );
        let err = module
            .invoke_local("SetVolume", &strings(&["loud"]))
            .unwrap_err();
        assert!(matches!(
            err,
            CommandError::InvalidArgument { index: 0, ref value, .. } if value == "loud"
        ));
    }

    #[test]
    fn test_internal_commands_hidden() {
        let module = test_module();
        assert!(module.command("Reset").is_some());
        assert!(module.remote_command("Reset").is_none());
        assert_eq!(module.command_names(), vec!["Play", "Seek", "SetVolume"]);
        assert_eq!(module.invoke_local("Reset", &[]), Ok(RpcResult::None));
    }

    #[test]
    fn test_duplicate_command_rejected() {
        let result = Module::builder("Playlist")
            .command("Count", &[], |_| Ok(0u32))
            .command("Count", &[], |_| Ok(1u32))
            .build();
        assert_eq!(
            result.unwrap_err(),
            RegistryError::DuplicateCommand {
                module: "Playlist".into(),
                command: "Count".into()
            }
        );
    }

    #[test]
    fn test_reserved_name_rejected() {
        let result = Module::builder(CONTROL_MODULE).build();
        assert!(matches!(result, Err(RegistryError::ReservedModuleName(_))));
    }

    #[test]
    fn test_signature_display() {
        assert_eq!(Signature::variadic(&["track"], "uris").to_string(), "(track, uris...)");
        assert_eq!(Signature::new(&[]).to_string(), "()");
    }
}
