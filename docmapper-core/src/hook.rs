//! Lifecycle hooks run around `find`, `update` and `save` operations.
//!
//! Each schema type owns a [`HookRegistry`] with a before-list and an
//! after-list per [`Action`]. The two phases are dispatched differently:
//!
//! - **Before** hooks run in registration order before the store client is
//!   called. Asynchronous hooks are awaited before the next hook starts. The
//!   first error aborts the operation and the store is never reached.
//! - **After** hooks are spawned on the connection's runtime once the store
//!   result is known. The caller never waits for them and their errors are only
//!   logged.
//!
//! # Example
//!
//! ```ignore
//! use docmapper::hook::{Hook, HookRegistration};
//!
//! hotels.before_save_hook(Hook::sync(|ctx| {
//!     if let Some(record) = ctx.record_mut() {
//!         record.insert("touched", true);
//!     }
//!     Ok(())
//! }));
//!
//! hotels.after_save_hook(
//!     HookRegistration::new(Hook::async_fn(|ctx| async move {
//!         audit(ctx.bound.clone()).await;
//!         Ok(ctx)
//!     }))
//!     .bind(["audit-channel"]),
//! );
//! ```

use bson::{Bson, Document};
use futures::{FutureExt, future::BoxFuture};
use parking_lot::RwLock;
use std::{fmt, sync::Arc};
use tokio::runtime::Handle;
use tracing::{debug, error};

use crate::{
    client::{FindOptions, UpdateOptions, UpdateResult},
    error::MapperResult,
    schema::SchemaDescriptor,
};

/// Lifecycle action a hook is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Find,
    Update,
    Save,
}

impl Action {
    fn index(self) -> usize {
        match self {
            Action::Find => 0,
            Action::Update => 1,
            Action::Save => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Find => "find",
            Action::Update => "update",
            Action::Save => "save",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a hook runs before or after the store call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Before,
    After,
}

/// Arguments of the operation being dispatched.
///
/// Before-hooks may rewrite them; the operation uses whatever the last hook left.
#[derive(Debug, Clone)]
pub enum OperationArgs {
    Find {
        filter: Document,
        options: FindOptions,
    },
    Update {
        filter: Document,
        update: Document,
        options: UpdateOptions,
    },
    Save {
        record: Document,
    },
}

/// What the store returned, as seen by after-hooks.
#[derive(Debug, Clone)]
pub enum Outcome {
    FindOne(Option<Document>),
    /// A cursor was handed to the caller. Its documents are not visible to hooks.
    Cursor,
    Updated(UpdateResult),
    Saved(Document),
}

/// Everything a hook is called with.
#[derive(Debug, Clone)]
pub struct HookContext {
    pub action: Action,
    pub phase: Phase,
    /// Descriptor of the schema type the operation runs on.
    pub schema: Arc<SchemaDescriptor>,
    /// Arguments bound at registration time.
    pub bound: Vec<Bson>,
    pub args: OperationArgs,
    /// Set for after-hooks only.
    pub outcome: Option<Outcome>,
}

impl HookContext {
    /// Creates a before-phase context.
    pub fn new(action: Action, schema: Arc<SchemaDescriptor>, args: OperationArgs) -> Self {
        Self {
            action,
            phase: Phase::Before,
            schema,
            bound: Vec::new(),
            args,
            outcome: None,
        }
    }

    /// Moves the context into the after phase with the store's outcome.
    pub fn with_outcome(mut self, outcome: Outcome) -> Self {
        self.phase = Phase::After;
        self.outcome = Some(outcome);
        self
    }

    /// The record being saved, for `save` operations.
    pub fn record(&self) -> Option<&Document> {
        match &self.args {
            OperationArgs::Save { record } => Some(record),
            _ => None,
        }
    }

    /// Mutable access to the record being saved.
    pub fn record_mut(&mut self) -> Option<&mut Document> {
        match &mut self.args {
            OperationArgs::Save { record } => Some(record),
            _ => None,
        }
    }

    /// The filter of a `find` or `update` operation.
    pub fn filter(&self) -> Option<&Document> {
        match &self.args {
            OperationArgs::Find { filter, .. } | OperationArgs::Update { filter, .. } => Some(filter),
            OperationArgs::Save { .. } => None,
        }
    }

    /// Mutable access to the filter of a `find` or `update` operation.
    pub fn filter_mut(&mut self) -> Option<&mut Document> {
        match &mut self.args {
            OperationArgs::Find { filter, .. } | OperationArgs::Update { filter, .. } => Some(filter),
            OperationArgs::Save { .. } => None,
        }
    }
}

type SyncHookFn = dyn Fn(&mut HookContext) -> MapperResult<()> + Send + Sync;
type AsyncHookFn = dyn Fn(HookContext) -> BoxFuture<'static, MapperResult<HookContext>> + Send + Sync;

/// A lifecycle callback.
#[derive(Clone)]
pub enum Hook {
    /// Runs to completion inline (before) or inside a spawned task (after).
    Sync(Arc<SyncHookFn>),
    /// Takes the context by value and hands it back when done.
    Async(Arc<AsyncHookFn>),
}

impl Hook {
    /// Wraps a synchronous callback.
    pub fn sync<F>(hook: F) -> Self
    where
        F: Fn(&mut HookContext) -> MapperResult<()> + Send + Sync + 'static,
    {
        Hook::Sync(Arc::new(hook))
    }

    /// Wraps an asynchronous callback.
    pub fn async_fn<F, Fut>(hook: F) -> Self
    where
        F: Fn(HookContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = MapperResult<HookContext>> + Send + 'static,
    {
        Hook::Async(Arc::new(move |ctx| hook(ctx).boxed()))
    }

    pub fn is_async(&self) -> bool {
        matches!(self, Hook::Async(_))
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hook::Sync(_) => f.write_str("Hook::Sync(..)"),
            Hook::Async(_) => f.write_str("Hook::Async(..)"),
        }
    }
}

/// A hook together with the arguments bound to it.
#[derive(Debug, Clone)]
pub struct HookRegistration {
    hook: Hook,
    bound: Vec<Bson>,
}

impl HookRegistration {
    pub fn new(hook: Hook) -> Self {
        Self { hook, bound: Vec::new() }
    }

    /// Binds arguments handed to the hook on every call through [`HookContext::bound`].
    pub fn bind<I, V>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        self.bound.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn hook(&self) -> &Hook {
        &self.hook
    }

    pub fn bound(&self) -> &[Bson] {
        &self.bound
    }
}

impl From<Hook> for HookRegistration {
    fn from(hook: Hook) -> Self {
        HookRegistration::new(hook)
    }
}

#[derive(Default)]
struct HookLists {
    before: [Vec<HookRegistration>; 3],
    after: [Vec<HookRegistration>; 3],
}

impl HookLists {
    fn list(&self, phase: Phase, action: Action) -> &Vec<HookRegistration> {
        match phase {
            Phase::Before => &self.before[action.index()],
            Phase::After => &self.after[action.index()],
        }
    }

    fn list_mut(&mut self, phase: Phase, action: Action) -> &mut Vec<HookRegistration> {
        match phase {
            Phase::Before => &mut self.before[action.index()],
            Phase::After => &mut self.after[action.index()],
        }
    }
}

/// Ordered hook lists of one schema type.
///
/// Registration may happen at any time, from any thread. Dispatch works on a
/// snapshot, so a hook registered while a dispatch is in flight runs from the
/// next dispatch on.
#[derive(Default)]
pub struct HookRegistry {
    lists: RwLock<HookLists>,
}

impl HookRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in hooks: field validation before
    /// save and a debug log of the saved record after save.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register(Phase::Before, Action::Save, Hook::sync(validate_fields_before_save));
        registry.register(Phase::After, Action::Save, Hook::sync(log_saved_record));
        registry
    }

    /// Appends a hook to the list of `phase` and `action`.
    pub fn register(&self, phase: Phase, action: Action, registration: impl Into<HookRegistration>) {
        self.lists
            .write()
            .list_mut(phase, action)
            .push(registration.into());
    }

    /// Snapshot of the registrations of `phase` and `action`, in order.
    pub fn registrations(&self, phase: Phase, action: Action) -> Vec<HookRegistration> {
        self.lists.read().list(phase, action).clone()
    }

    /// Number of hooks registered for `phase` and `action`.
    pub fn len(&self, phase: Phase, action: Action) -> usize {
        self.lists.read().list(phase, action).len()
    }

    /// Runs the before-hooks of `ctx.action` in order and returns the context
    /// they leave behind.
    ///
    /// # Errors
    ///
    /// Returns the first hook error; later hooks do not run.
    pub async fn run_before(&self, mut ctx: HookContext) -> MapperResult<HookContext> {
        ctx.phase = Phase::Before;

        for (position, registration) in self
            .registrations(Phase::Before, ctx.action)
            .into_iter()
            .enumerate()
        {
            debug!(action = %ctx.action, schema = ctx.schema.name(), position, "running before hook");

            ctx.bound = registration.bound;
            ctx = match registration.hook {
                Hook::Sync(hook) => {
                    hook(&mut ctx)?;
                    ctx
                }
                Hook::Async(hook) => hook(ctx).await?,
            };
        }

        ctx.bound = Vec::new();
        Ok(ctx)
    }

    /// Spawns the after-hooks of `ctx.action` on `runtime` and returns at once.
    pub fn run_after(&self, mut ctx: HookContext, runtime: &Handle) {
        ctx.phase = Phase::After;

        for registration in self.registrations(Phase::After, ctx.action) {
            let mut ctx = ctx.clone();
            ctx.bound = registration.bound;

            let action = ctx.action;
            let schema = ctx.schema.name().to_string();

            debug!(%action, %schema, asynchronous = registration.hook.is_async(), "scheduling after hook");

            match registration.hook {
                Hook::Sync(hook) => {
                    runtime.spawn(async move {
                        if let Err(err) = hook(&mut ctx) {
                            error!(%action, %schema, error = %err, "after hook failed");
                        }
                    });
                }
                Hook::Async(hook) => {
                    runtime.spawn(async move {
                        if let Err(err) = hook(ctx).await {
                            error!(%action, %schema, error = %err, "after hook failed");
                        }
                    });
                }
            }
        }
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lists = self.lists.read();
        let counts = |phase| {
            [Action::Find, Action::Update, Action::Save]
                .map(|action| lists.list(phase, action).len())
        };

        f.debug_struct("HookRegistry")
            .field("before", &counts(Phase::Before))
            .field("after", &counts(Phase::After))
            .finish()
    }
}

/// Built-in before-save hook: fills defaults and validates declared fields.
pub fn validate_fields_before_save(ctx: &mut HookContext) -> MapperResult<()> {
    let schema = ctx.schema.clone();

    match ctx.record_mut() {
        Some(record) => schema.prepare_record(record),
        None => Ok(()),
    }
}

/// Built-in after-save hook: logs the saved record.
pub fn log_saved_record(ctx: &mut HookContext) -> MapperResult<()> {
    if let Some(Outcome::Saved(record)) = &ctx.outcome {
        debug!(schema = ctx.schema.name(), %record, "after save");
    }

    Ok(())
}
