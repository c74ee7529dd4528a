//! Channel router: envelope → (scope, channel) → privilege → liveness →
//! validate → handle.
//!
//! # What is a channel? (for beginners)
//!
//! A channel is a named inbox for one kind of client command, e.g. `paint`
//! for the drawing mode or `ping` for the liveness check.  Every channel is
//! registered under a [`ChannelScope`]: either `Global` (always reachable)
//! or `Mode(name)` (reachable only while that mode is the active one).
//!
//! The router itself never decides which mode is active.  The caller passes
//! the active mode's name into [`ChannelRouter::dispatch`] on every call, and
//! reachability is the pure function [`ChannelScope::is_reachable`].  That
//! keeps the liveness check re-evaluated per message rather than cached at
//! connection time.
//!
//! # Dropped messages
//!
//! No error ever goes back to the sender.  Each drop is logged at a level
//! that matches its class and reported to the caller as a [`DropReason`] so
//! tests can tell the classes apart.

use std::collections::HashMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use mission_core::{Envelope, LayoutRegistry, Privilege};

use super::connections::{Connection, ConnectionSet};

// ── Scope ─────────────────────────────────────────────────────────────────────

/// Where a channel is registered.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChannelScope {
    Global,
    Mode(String),
}

impl ChannelScope {
    /// Derives the scope an inbound envelope addresses.
    fn of(envelope: &Envelope) -> Self {
        match &envelope.mode {
            Some(mode) => ChannelScope::Mode(mode.clone()),
            None => ChannelScope::Global,
        }
    }

    /// Returns `true` if a channel in this scope may run while `active` is
    /// the active mode.
    pub fn is_reachable(&self, active: Option<&str>) -> bool {
        match self {
            ChannelScope::Global => true,
            ChannelScope::Mode(name) => active == Some(name.as_str()),
        }
    }
}

impl fmt::Display for ChannelScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelScope::Global => f.write_str("global"),
            ChannelScope::Mode(name) => f.write_str(name),
        }
    }
}

// ── Outcomes and errors ───────────────────────────────────────────────────────

/// Why a message was not delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// Not JSON, or not shaped like an envelope.
    MalformedEnvelope,
    /// No channel registered under the addressed `(scope, name)`.
    UnknownChannel,
    /// The sender's privilege is below the channel's requirement.
    Unauthorized,
    /// The channel's mode is no longer the active mode.
    StaleMode,
    /// The validator rejected the payload.
    InvalidMessage(String),
    /// The sender is not a known open connection.
    UnknownConnection,
}

/// Result of routing one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered,
    Dropped(DropReason),
}

/// Errors raised while registering channels.
#[derive(Debug, Error, PartialEq)]
pub enum RouterError {
    #[error("channel {channel} is already registered in scope {scope}")]
    DuplicateChannel { scope: ChannelScope, channel: String },
}

// ── Handler context ───────────────────────────────────────────────────────────

/// What a validator or handler can see and touch during one dispatch.
pub struct ChannelContext<'a> {
    from: &'a Connection,
    connections: &'a ConnectionSet,
    layout: &'a mut LayoutRegistry,
    switch_request: Option<String>,
}

impl<'a> ChannelContext<'a> {
    pub fn new(
        from: &'a Connection,
        connections: &'a ConnectionSet,
        layout: &'a mut LayoutRegistry,
    ) -> Self {
        Self {
            from,
            connections,
            layout,
            switch_request: None,
        }
    }

    /// The connection the message came from.
    pub fn from(&self) -> &Connection {
        self.from
    }

    /// Sends an envelope back to the sender only.
    pub fn reply(&self, envelope: &Envelope) {
        self.from.send_envelope(envelope);
    }

    pub fn connections(&self) -> &ConnectionSet {
        self.connections
    }

    pub fn layout(&self) -> &LayoutRegistry {
        &*self.layout
    }

    pub fn layout_mut(&mut self) -> &mut LayoutRegistry {
        &mut *self.layout
    }

    /// Asks the coordinator to switch modes once this dispatch returns.
    pub fn request_switch(&mut self, mode: impl Into<String>) {
        self.switch_request = Some(mode.into());
    }

    /// Takes the pending switch request, if any.
    pub fn take_switch_request(&mut self) -> Option<String> {
        self.switch_request.take()
    }
}

// ── Channel specs ─────────────────────────────────────────────────────────────

type Invoke = Box<dyn Fn(Value, &mut ChannelContext<'_>) -> Result<(), String> + Send + Sync>;

// Pins the closure signature so it is general over the context lifetimes.
fn invoke_fn<F>(f: F) -> F
where
    F: Fn(Value, &mut ChannelContext<'_>) -> Result<(), String> + Send + Sync,
{
    f
}

/// A named, privilege-checked, validated handler.
pub struct ChannelSpec {
    name: String,
    privilege: Privilege,
    invoke: Invoke,
}

impl ChannelSpec {
    /// Builds a channel from a validator and a handler.
    ///
    /// The validator turns the raw JSON payload into `T` or explains why it
    /// cannot; the handler runs only for payloads that validated.
    pub fn new<T, V, H>(name: impl Into<String>, privilege: Privilege, validator: V, handler: H) -> Self
    where
        T: 'static,
        V: Fn(Value, &ChannelContext<'_>) -> Result<T, String> + Send + Sync + 'static,
        H: Fn(T, &mut ChannelContext<'_>) + Send + Sync + 'static,
    {
        let invoke: Invoke = Box::new(invoke_fn(move |message, ctx| {
            let value = validator(message, &*ctx)?;
            handler(value, ctx);
            Ok(())
        }));
        Self {
            name: name.into(),
            privilege,
            invoke,
        }
    }

    /// Builds a channel whose validator is "deserialises into `T`".
    pub fn json<T, H>(name: impl Into<String>, privilege: Privilege, handler: H) -> Self
    where
        T: DeserializeOwned + 'static,
        H: Fn(T, &mut ChannelContext<'_>) + Send + Sync + 'static,
    {
        Self::new(
            name,
            privilege,
            |message, _| serde_json::from_value::<T>(message).map_err(|e| e.to_string()),
            handler,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn privilege(&self) -> Privilege {
        self.privilege
    }
}

impl fmt::Debug for ChannelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelSpec")
            .field("name", &self.name)
            .field("privilege", &self.privilege)
            .finish_non_exhaustive()
    }
}

// ── Router ────────────────────────────────────────────────────────────────────

/// Table of every registered channel, keyed by `(scope, name)`.
#[derive(Default)]
pub struct ChannelRouter {
    channels: HashMap<(ChannelScope, String), ChannelSpec>,
}

impl ChannelRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a channel that is reachable regardless of the active mode.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::DuplicateChannel`] if the name is taken.
    pub fn register_global(&mut self, channel: ChannelSpec) -> Result<(), RouterError> {
        self.insert(ChannelScope::Global, channel)
    }

    /// Registers every channel a mode defines under `Mode(mode)`.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::DuplicateChannel`] on the first name clash;
    /// channels before it stay registered.
    pub fn register_for_mode(
        &mut self,
        mode: &str,
        channels: impl IntoIterator<Item = ChannelSpec>,
    ) -> Result<(), RouterError> {
        for channel in channels {
            self.insert(ChannelScope::Mode(mode.to_string()), channel)?;
        }
        Ok(())
    }

    fn insert(&mut self, scope: ChannelScope, channel: ChannelSpec) -> Result<(), RouterError> {
        let key = (scope, channel.name.clone());
        if self.channels.contains_key(&key) {
            return Err(RouterError::DuplicateChannel {
                scope: key.0,
                channel: key.1,
            });
        }
        self.channels.insert(key, channel);
        Ok(())
    }

    /// Number of registered channels across all scopes.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Routes one raw inbound text frame.
    ///
    /// `active` is the name of the active mode at the moment of dispatch.
    pub fn dispatch(
        &self,
        raw: &str,
        active: Option<&str>,
        ctx: &mut ChannelContext<'_>,
    ) -> DispatchOutcome {
        let envelope = match Envelope::parse(raw) {
            Ok(e) => e,
            Err(e) => {
                warn!(connection = %ctx.from().id(), "dropping message: {e}");
                return DispatchOutcome::Dropped(DropReason::MalformedEnvelope);
            }
        };

        let key = (ChannelScope::of(&envelope), envelope.channel);
        let Some(channel) = self.channels.get(&key) else {
            warn!(scope = %key.0, channel = %key.1, "dropping message for unknown channel");
            return DispatchOutcome::Dropped(DropReason::UnknownChannel);
        };

        if !ctx.from().privilege().permits(channel.privilege) {
            debug!(
                connection = %ctx.from().id(),
                scope = %key.0,
                channel = %key.1,
                "dropping message: insufficient privilege"
            );
            return DispatchOutcome::Dropped(DropReason::Unauthorized);
        }

        if !key.0.is_reachable(active) {
            debug!(
                scope = %key.0,
                channel = %key.1,
                active = active.unwrap_or("<none>"),
                "dropping message: stale mode"
            );
            return DispatchOutcome::Dropped(DropReason::StaleMode);
        }

        match (channel.invoke)(envelope.message, ctx) {
            Ok(()) => DispatchOutcome::Delivered,
            Err(reason) => {
                warn!(scope = %key.0, channel = %key.1, "invalid message: {reason}");
                DispatchOutcome::Dropped(DropReason::InvalidMessage(reason))
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
