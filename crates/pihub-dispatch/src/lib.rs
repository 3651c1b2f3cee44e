//! # pihub-dispatch: command routing for the PiHub daemon
//!
//! A fixed-capacity table of `{target, action} -> handler` entries
//! with a tokenizer and an invoker. Commands arrive as delimited text
//! (`"gpio set 13 1"`); the dispatcher splits the line, finds the
//! first registered entry whose target and action match
//! (ASCII-case-insensitively) and invokes its handler with the parsed
//! argument vector and a caller-supplied context.
//!
//! The dispatcher is thread-safe: registration, deregistration and
//! execution may happen from any thread. Handler invocation runs
//! under the dispatcher lock, so handlers must not call back into
//! `register`/`deregister`.
//!
//! The context type is generic. The serving path uses it to carry the
//! originating client and a reference to the hub state, so handlers
//! never need process-wide mutable state.
//!
//! ```
//! use pihub_dispatch::{CommandSpec, Dispatcher, DispatcherConfig};
//!
//! let dispatcher: Dispatcher<()> = Dispatcher::new(DispatcherConfig::default()).unwrap();
//! dispatcher
//!     .register(0, CommandSpec::new("gpio", "set", |args, _ctx| {
//!         println!("line {} -> {}", args[0], args[1]);
//!     }))
//!     .unwrap();
//! dispatcher.execute("gpio set 13 1", &()).unwrap();
//! ```

use std::sync::Mutex;

use tracing::{debug, trace};

mod error;
mod tokenize;

pub use error::{DispatchError, DispatchResult};

use tokenize::tokenize;

/// Maximum number of commands the table can hold.
pub const MAX_COMMANDS: usize = 16;
/// Maximum length of the target token, exclusive.
pub const TARGET_MAX: usize = 32;
/// Maximum length of the action token, exclusive.
pub const ACTION_MAX: usize = 32;
/// Maximum length of a single argument token, exclusive.
pub const ARG_MAX: usize = 32;
/// Maximum number of arguments in one command.
pub const MAX_ARGS: usize = 10;
/// Maximum length of the delimiter string.
pub const DELIM_MAX: usize = 8;
/// Maximum accepted input length, exclusive (single-byte delimiter assumed).
pub const MAX_INPUT: usize = TARGET_MAX + 1 + ACTION_MAX + 1 + (ARG_MAX + 1) * MAX_ARGS;

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Delimiter string; every byte acts as a token separator.
    pub delimiter: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            delimiter: " ".to_string(),
        }
    }
}

/// Boxed handler invoked when a command matches.
///
/// Receives the parsed argument vector and the caller-supplied
/// execution context.
pub type CommandHandler<C> = Box<dyn Fn(&[&str], &C) + Send + Sync>;

/// One command definition: target, action and the handler to invoke.
pub struct CommandSpec<C> {
    target: String,
    action: String,
    handler: CommandHandler<C>,
}

impl<C> CommandSpec<C> {
    /// Builds a command definition from tokens and a handler closure.
    pub fn new(
        target: impl Into<String>,
        action: impl Into<String>,
        handler: impl Fn(&[&str], &C) + Send + Sync + 'static,
    ) -> Self {
        Self {
            target: target.into(),
            action: action.into(),
            handler: Box::new(handler),
        }
    }

    /// The target token this command matches.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// The action token this command matches.
    pub fn action(&self) -> &str {
        &self.action
    }
}

impl<C> std::fmt::Debug for CommandSpec<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSpec")
            .field("target", &self.target)
            .field("action", &self.action)
            .finish_non_exhaustive()
    }
}

/// Thread-safe command table with a fixed number of indexed slots.
///
/// The slot index is the command's identity: `register` fails with
/// [`DispatchError::IdAlreadyTaken`] when the slot is populated, and
/// `deregister` simply empties it. On lookup the table is scanned in
/// slot order, so the lowest registered slot wins when two commands
/// share a target and action.
pub struct Dispatcher<C> {
    delimiter: String,
    slots: Mutex<[Option<CommandSpec<C>>; MAX_COMMANDS]>,
}

impl<C> Dispatcher<C> {
    /// Creates an empty dispatcher.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidArgument`] when the delimiter
    /// is empty or longer than [`DELIM_MAX`] bytes.
    pub fn new(config: DispatcherConfig) -> DispatchResult<Self> {
        if config.delimiter.is_empty() {
            return Err(DispatchError::InvalidArgument(
                "delimiter must not be empty".to_string(),
            ));
        }
        if config.delimiter.len() > DELIM_MAX {
            return Err(DispatchError::InvalidArgument(format!(
                "delimiter exceeds {DELIM_MAX} bytes"
            )));
        }

        Ok(Self {
            delimiter: config.delimiter,
            slots: Mutex::new(std::array::from_fn(|_| None)),
        })
    }

    /// Registers a command in slot `id`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidArgument`] when the id is out
    /// of range or a token is empty or over-long, and
    /// [`DispatchError::IdAlreadyTaken`] when the slot is populated.
    pub fn register(&self, id: usize, spec: CommandSpec<C>) -> DispatchResult<()> {
        if id >= MAX_COMMANDS {
            return Err(DispatchError::InvalidArgument(format!(
                "command id {id} out of range (max {})",
                MAX_COMMANDS - 1
            )));
        }
        if spec.target.is_empty() || spec.action.is_empty() {
            return Err(DispatchError::InvalidArgument(
                "target and action must not be empty".to_string(),
            ));
        }
        if spec.target.len() >= TARGET_MAX || spec.action.len() >= ACTION_MAX {
            return Err(DispatchError::InvalidArgument(
                "target or action exceeds its maximum length".to_string(),
            ));
        }

        let mut slots = self.slots.lock().map_err(|_| DispatchError::LockPoisoned)?;
        if slots[id].is_some() {
            return Err(DispatchError::IdAlreadyTaken(id));
        }

        debug!(id, cmd_target = %spec.target, cmd_action = %spec.action, "command registered");
        slots[id] = Some(spec);
        Ok(())
    }

    /// Empties slot `id`. Deregistering an empty slot is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidArgument`] when the id is out
    /// of range.
    pub fn deregister(&self, id: usize) -> DispatchResult<()> {
        if id >= MAX_COMMANDS {
            return Err(DispatchError::InvalidArgument(format!(
                "command id {id} out of range (max {})",
                MAX_COMMANDS - 1
            )));
        }

        let mut slots = self.slots.lock().map_err(|_| DispatchError::LockPoisoned)?;
        if slots[id].take().is_some() {
            debug!(id, "command deregistered");
        }
        Ok(())
    }

    /// Parses `input` and invokes the first matching handler.
    ///
    /// Matching compares target and action ASCII-case-insensitively;
    /// the handler runs under the dispatcher lock and receives the
    /// argument vector plus `ctx`.
    ///
    /// # Errors
    ///
    /// Returns a tokenizer error for malformed input and
    /// [`DispatchError::CmdNotFound`] when no slot matches.
    pub fn execute(&self, input: &str, ctx: &C) -> DispatchResult<()> {
        if input.len() >= MAX_INPUT {
            return Err(DispatchError::BufTooLong);
        }

        let cmd = tokenize(input, &self.delimiter)?;
        trace!(cmd_target = cmd.target, cmd_action = cmd.action, argc = cmd.args.len(), "dispatching");

        let slots = self.slots.lock().map_err(|_| DispatchError::LockPoisoned)?;
        for spec in slots.iter().flatten() {
            if spec.target.eq_ignore_ascii_case(cmd.target)
                && spec.action.eq_ignore_ascii_case(cmd.action)
            {
                (spec.handler)(&cmd.args, ctx);
                return Ok(());
            }
        }

        Err(DispatchError::CmdNotFound)
    }

    /// Returns the number of populated slots.
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .map(|slots| slots.iter().filter(|s| s.is_some()).count())
            .unwrap_or(0)
    }

    /// Returns true when no command is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<C> std::fmt::Debug for Dispatcher<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("delimiter", &self.delimiter)
            .field("registered", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Context that records every invocation for assertions.
    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl Recorder {
        fn record(&self, args: &[&str]) {
            let owned = args.iter().map(|a| a.to_string()).collect();
            self.calls.lock().unwrap().push(owned);
        }

        fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }
    }

    fn recording_dispatcher() -> Dispatcher<Recorder> {
        let dispatcher = Dispatcher::new(DispatcherConfig::default()).unwrap();
        dispatcher
            .register(
                0,
                CommandSpec::new("gpio", "set", |args, ctx: &Recorder| ctx.record(args)),
            )
            .unwrap();
        dispatcher
    }

    #[test]
    fn register_and_execute() {
        let dispatcher = recording_dispatcher();
        let ctx = Recorder::default();

        dispatcher.execute("gpio set 13 1", &ctx).unwrap();

        let calls = ctx.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], vec!["13", "1"]);
    }

    #[test]
    fn routing_is_case_insensitive() {
        let dispatcher = recording_dispatcher();
        let ctx = Recorder::default();

        dispatcher.execute("GPiO SeT 0 ok", &ctx).unwrap();
        assert_eq!(ctx.calls()[0], vec!["0", "ok"]);

        assert_eq!(
            dispatcher.execute("GPiO SeTs 0", &ctx).unwrap_err(),
            DispatchError::CmdNotFound
        );
        assert_eq!(ctx.calls().len(), 1);
    }

    #[test]
    fn buffer_at_max_rejected_one_below_accepted() {
        let dispatcher = recording_dispatcher();
        let ctx = Recorder::default();

        // Padding delimiters collapse, so the command stays valid while
        // the buffer length is driven to the exact boundary.
        let base = "gpio set 1";
        let at_max = format!("{base}{}", " ".repeat(MAX_INPUT - base.len()));
        assert_eq!(at_max.len(), MAX_INPUT);
        assert_eq!(
            dispatcher.execute(&at_max, &ctx).unwrap_err(),
            DispatchError::BufTooLong
        );

        let below_max = format!("{base}{}", " ".repeat(MAX_INPUT - 1 - base.len()));
        assert_eq!(below_max.len(), MAX_INPUT - 1);
        dispatcher.execute(&below_max, &ctx).unwrap();
        assert_eq!(ctx.calls(), vec![vec!["1".to_string()]]);
    }

    #[test]
    fn empty_buffer_rejected() {
        let dispatcher = recording_dispatcher();
        let ctx = Recorder::default();

        assert_eq!(
            dispatcher.execute("", &ctx).unwrap_err(),
            DispatchError::BufEmpty
        );
        assert_eq!(
            dispatcher.execute("   ", &ctx).unwrap_err(),
            DispatchError::BufEmpty
        );
    }

    #[test]
    fn same_input_routes_to_same_handler() {
        let dispatcher = recording_dispatcher();
        dispatcher
            .register(
                1,
                CommandSpec::new("gpio", "get", |args, ctx: &Recorder| ctx.record(args)),
            )
            .unwrap();
        let ctx = Recorder::default();

        dispatcher.execute("gpio set 4 0", &ctx).unwrap();
        dispatcher.execute("gpio set 4 0", &ctx).unwrap();

        let calls = ctx.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], calls[1]);
    }

    #[test]
    fn first_registered_slot_wins() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let dispatcher: Dispatcher<()> = Dispatcher::new(DispatcherConfig::default()).unwrap();
        let hits = Arc::clone(&first);
        dispatcher
            .register(
                3,
                CommandSpec::new("server", "status", move |_, _| {
                    hits.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
        let hits = Arc::clone(&second);
        dispatcher
            .register(
                7,
                CommandSpec::new("server", "status", move |_, _| {
                    hits.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        dispatcher.execute("server status", &()).unwrap();

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn register_deregister_register_cycle() {
        let dispatcher: Dispatcher<Recorder> =
            Dispatcher::new(DispatcherConfig::default()).unwrap();

        let spec = || CommandSpec::new("gpio", "set", |args, ctx: &Recorder| ctx.record(args));
        dispatcher.register(0, spec()).unwrap();
        dispatcher.deregister(0).unwrap();
        dispatcher.register(0, spec()).unwrap();

        let ctx = Recorder::default();
        dispatcher.execute("gpio set 1 1", &ctx).unwrap();
        assert_eq!(ctx.calls().len(), 1, "behaves as a single registration");
    }

    #[test]
    fn deregister_empty_slot_is_ok() {
        let dispatcher: Dispatcher<()> = Dispatcher::new(DispatcherConfig::default()).unwrap();
        dispatcher.deregister(5).unwrap();
    }

    #[test]
    fn duplicate_id_rejected() {
        let dispatcher = recording_dispatcher();
        let err = dispatcher
            .register(
                0,
                CommandSpec::new("other", "cmd", |args, ctx: &Recorder| ctx.record(args)),
            )
            .unwrap_err();
        assert_eq!(err, DispatchError::IdAlreadyTaken(0));
    }

    #[test]
    fn out_of_range_ids_rejected() {
        let dispatcher: Dispatcher<()> = Dispatcher::new(DispatcherConfig::default()).unwrap();
        assert!(matches!(
            dispatcher.register(MAX_COMMANDS, CommandSpec::new("a", "b", |_, _| {})),
            Err(DispatchError::InvalidArgument(_))
        ));
        assert!(matches!(
            dispatcher.deregister(MAX_COMMANDS),
            Err(DispatchError::InvalidArgument(_))
        ));
    }

    #[test]
    fn empty_tokens_rejected_at_registration() {
        let dispatcher: Dispatcher<()> = Dispatcher::new(DispatcherConfig::default()).unwrap();
        assert!(matches!(
            dispatcher.register(0, CommandSpec::new("", "set", |_, _| {})),
            Err(DispatchError::InvalidArgument(_))
        ));
        assert!(matches!(
            dispatcher.register(0, CommandSpec::new("gpio", "", |_, _| {})),
            Err(DispatchError::InvalidArgument(_))
        ));
    }

    #[test]
    fn overlong_tokens_rejected_at_registration() {
        let dispatcher: Dispatcher<()> = Dispatcher::new(DispatcherConfig::default()).unwrap();
        let long = "x".repeat(TARGET_MAX);
        assert!(matches!(
            dispatcher.register(0, CommandSpec::new(long, "set", |_, _| {})),
            Err(DispatchError::InvalidArgument(_))
        ));
    }

    #[test]
    fn delimiter_validation() {
        assert!(matches!(
            Dispatcher::<()>::new(DispatcherConfig {
                delimiter: String::new()
            }),
            Err(DispatchError::InvalidArgument(_))
        ));
        assert!(matches!(
            Dispatcher::<()>::new(DispatcherConfig {
                delimiter: "123456789".to_string()
            }),
            Err(DispatchError::InvalidArgument(_))
        ));
        assert!(Dispatcher::<()>::new(DispatcherConfig {
            delimiter: ", ".to_string()
        })
        .is_ok());
    }

    #[test]
    fn len_tracks_registrations() {
        let dispatcher: Dispatcher<()> = Dispatcher::new(DispatcherConfig::default()).unwrap();
        assert!(dispatcher.is_empty());
        dispatcher
            .register(2, CommandSpec::new("a", "b", |_, _| {}))
            .unwrap();
        dispatcher
            .register(9, CommandSpec::new("c", "d", |_, _| {}))
            .unwrap();
        assert_eq!(dispatcher.len(), 2);
        dispatcher.deregister(2).unwrap();
        assert_eq!(dispatcher.len(), 1);
    }
}
