//! The event dispatch bridge.
//!
//! [`EventBridge::dispatch`] is the single path from a native stub into the
//! scripting layer. It never fails: every problem degrades to
//! [`Verdict::Passthrough`] and, where it matters, one diagnostic line.

use crate::call::EventCall;
use crate::diagnostics::{DiagnosticSink, TracingSink};
use crate::error::EventError;
use crate::kind::EventKind;
use crate::queryable::QueryableClient;
use crate::registry::HandlerRegistry;
use crate::stats::{DispatchCounters, DispatchStats};
use crate::token::InterpreterLock;
use crate::value::ScriptValue;
use crate::verdict::{interpret, Fault, Verdict};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, trace};

pub const DEFAULT_MAX_TEXT_LEN: usize = 4095;

/// The embedded interpreter, as the bridge needs to see it.
///
/// Implementations are only ever touched while the interpreter access token
/// is held, so `invoke` takes `&mut self`.
pub trait ScriptRuntime: Send {
    type Handler: Clone + Send + Sync;

    fn invoke(&mut self, handler: &Self::Handler, call: &EventCall) -> Result<ScriptValue, EventError>;
}

/// What an interception stub talks to.
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, call: EventCall) -> Verdict;

    /// Whether an event of `kind` would reach a handler right now.
    ///
    /// Stubs use this to skip work whose only purpose is building the
    /// [`EventCall`]. A `false` answer must mean [`dispatch`](Self::dispatch)
    /// would return [`Verdict::Passthrough`].
    fn is_listening(&self, kind: EventKind) -> bool {
        let _ = kind;
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeSettings {
    pub max_text_len: usize,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            max_text_len: DEFAULT_MAX_TEXT_LEN,
        }
    }
}

pub struct EventBridge<R: ScriptRuntime> {
    token: InterpreterLock<R>,
    registry: Arc<HandlerRegistry<R::Handler>>,
    queryable: Arc<QueryableClient>,
    sink: Arc<dyn DiagnosticSink>,
    settings: BridgeSettings,
    counters: DispatchCounters,
}

impl<R: ScriptRuntime> EventBridge<R> {
    pub fn new(
        runtime: R,
        registry: Arc<HandlerRegistry<R::Handler>>,
        queryable: Arc<QueryableClient>,
        settings: BridgeSettings,
    ) -> Self {
        Self::with_sink(runtime, registry, queryable, settings, Arc::new(TracingSink))
    }

    pub fn with_sink(
        runtime: R,
        registry: Arc<HandlerRegistry<R::Handler>>,
        queryable: Arc<QueryableClient>,
        settings: BridgeSettings,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Self {
        Self {
            token: InterpreterLock::new(runtime),
            registry,
            queryable,
            sink,
            settings,
            counters: DispatchCounters::default(),
        }
    }

    /// Delivers one event to its handler and decides what the engine does.
    ///
    /// When no handler is registered for the event's kind this returns at
    /// once, without touching the interpreter. Otherwise the access token is
    /// taken, the connect and disconnect query window is opened around the
    /// call, and the result goes through [`interpret`].
    ///
    /// # Arguments
    ///
    /// * `call` - The event and its arguments, as built by a stub
    ///
    /// # Returns
    ///
    /// The [`Verdict`] for the engine. Failures never escape: a raised error,
    /// a panic, a nested dispatch on the same thread or a malformed result
    /// all give [`Verdict::Passthrough`], and all but the nested case leave
    /// one diagnostic line.
    pub fn dispatch(&self, call: EventCall) -> Verdict {
        DispatchCounters::bump(&self.counters.dispatched);
        let kind = call.kind();

        if !self.registry.contains(kind) {
            DispatchCounters::bump(&self.counters.short_circuited);
            return Verdict::Passthrough;
        }

        let mut runtime = match self.token.acquire() {
            Ok(token) => token,
            Err(_) => {
                DispatchCounters::bump(&self.counters.reentrant);
                debug!("Skipping nested {} dispatch", kind);
                return Verdict::Passthrough;
            }
        };

        // Looked up under the token so a concurrent reinitialize cannot hand
        // us a handler from a runtime that no longer exists.
        let Some(handler) = self.registry.get(kind) else {
            DispatchCounters::bump(&self.counters.short_circuited);
            return Verdict::Passthrough;
        };

        let _window = match (kind.opens_query_window(), call.client_id()) {
            (true, Some(id)) => Some(self.queryable.open(id)),
            _ => None,
        };

        DispatchCounters::bump(&self.counters.invocations);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| runtime.invoke(&handler, &call)))
            .unwrap_or_else(|payload| Err(EventError::HandlerExecution(panic_message(payload))));

        let interpretation = interpret(kind, outcome, self.settings.max_text_len);
        if let Some(fault) = &interpretation.fault {
            match fault {
                Fault::Invocation(_) => DispatchCounters::bump(&self.counters.failures),
                Fault::Malformed(_) => DispatchCounters::bump(&self.counters.malformed),
            }
            self.sink.report(kind.script_name(), &fault.error().to_string());
        }
        trace!("{} -> {:?}", kind, interpretation.verdict);
        interpretation.verdict
    }

    /// Runs `f` with exclusive access to the runtime, e.g. to rebuild it.
    ///
    /// # Errors
    ///
    /// [`EventError::Reentrant`] when called from inside a handler.
    pub fn with_runtime<T>(&self, f: impl FnOnce(&mut R) -> T) -> Result<T, EventError> {
        let mut runtime = self.token.acquire()?;
        Ok(f(&mut runtime))
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry<R::Handler>> {
        &self.registry
    }

    pub fn queryable(&self) -> &Arc<QueryableClient> {
        &self.queryable
    }

    pub fn settings(&self) -> BridgeSettings {
        self.settings
    }

    pub fn stats(&self) -> DispatchStats {
        self.counters
            .snapshot(self.token.acquisitions(), self.token.releases())
    }
}

impl<R: ScriptRuntime> Dispatcher for EventBridge<R> {
    fn dispatch(&self, call: EventCall) -> Verdict {
        EventBridge::dispatch(self, call)
    }

    fn is_listening(&self, kind: EventKind) -> bool {
        self.registry.contains(kind)
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("handler panicked: {detail}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectingSink;
    use crate::kind::EventKind;
    use crate::think::ThinkInput;
    use crate::verdict::Replacement;

    /// Handlers are plain functions of the call.
    type FakeHandler = Arc<dyn Fn(&EventCall) -> Result<ScriptValue, EventError> + Send + Sync>;

    #[derive(Default)]
    struct FakeRuntime {
        calls: usize,
    }

    impl ScriptRuntime for FakeRuntime {
        type Handler = FakeHandler;

        fn invoke(&mut self, handler: &FakeHandler, call: &EventCall) -> Result<ScriptValue, EventError> {
            self.calls += 1;
            handler(call)
        }
    }

    fn bridge() -> (EventBridge<FakeRuntime>, Arc<CollectingSink>) {
        let sink = Arc::new(CollectingSink::new());
        let bridge = EventBridge::with_sink(
            FakeRuntime::default(),
            Arc::new(HandlerRegistry::new()),
            Arc::new(QueryableClient::new()),
            BridgeSettings::default(),
            sink.clone(),
        );
        (bridge, sink)
    }

    fn returning(value: ScriptValue) -> FakeHandler {
        Arc::new(move |_| Ok(value.clone()))
    }

    #[test]
    fn no_handler_never_touches_the_token() {
        let (bridge, _) = bridge();
        for _ in 0..10 {
            assert_eq!(bridge.dispatch(EventCall::frame()), Verdict::Passthrough);
        }
        let stats = bridge.stats();
        assert_eq!(stats.token_acquisitions, 0);
        assert_eq!(stats.events_short_circuited, 10);
    }

    #[test]
    fn token_is_paired_even_when_handlers_fail() {
        let (bridge, sink) = bridge();
        let handler: FakeHandler = Arc::new(|call| match call.args()[0] {
            crate::call::EventArg::Int(id) if id % 3 == 0 => Err(EventError::HandlerExecution("raised".into())),
            crate::call::EventArg::Int(id) if id % 3 == 1 => panic!("boom"),
            _ => Ok(ScriptValue::Nil),
        });
        bridge.registry().register(EventKind::ClientSpawn, handler);

        for id in 0..9 {
            assert_eq!(bridge.dispatch(EventCall::client_spawn(id)), Verdict::Passthrough);
        }
        let stats = bridge.stats();
        assert_eq!(stats.token_acquisitions, 9);
        assert_eq!(stats.token_releases, 9);
        assert_eq!(stats.invocation_failures, 6);
        assert_eq!(sink.count(), 6);
        assert_eq!(bridge.with_runtime(|rt| rt.calls).unwrap(), 9);
    }

    #[test]
    fn client_command_can_be_suppressed_or_rewritten() {
        let (bridge, _) = bridge();
        bridge
            .registry()
            .register(EventKind::ClientCommand, returning(ScriptValue::Bool(false)));
        assert_eq!(bridge.dispatch(EventCall::client_command(1, b"say hi")), Verdict::Suppress);

        bridge
            .registry()
            .register(EventKind::ClientCommand, returning(ScriptValue::Text("x".repeat(5000))));
        match bridge.dispatch(EventCall::client_command(1, b"say hi")) {
            Verdict::Replace(Replacement::Text(text)) => assert_eq!(text.len(), DEFAULT_MAX_TEXT_LEN),
            other => panic!("unexpected verdict {other:?}"),
        }
    }

    #[test]
    fn malformed_think_record_yields_one_diagnostic() {
        let (bridge, sink) = bridge();
        let mut record = ThinkInput::default().to_record();
        record.remove("upmove");
        bridge
            .registry()
            .register(EventKind::ClientThink, returning(ScriptValue::Record(record)));

        let verdict = bridge.dispatch(EventCall::client_think(2, &ThinkInput::default()));
        assert_eq!(verdict, Verdict::Passthrough);
        assert_eq!(sink.count(), 1);
        assert!(sink.lines()[0].contains("missing field 'upmove'"));
        assert_eq!(bridge.stats().malformed_results, 1);
    }

    #[test]
    fn connect_handler_sees_the_query_window() {
        let (bridge, _) = bridge();
        let queryable = bridge.queryable().clone();
        let handler: FakeHandler = Arc::new(move |call| {
            let id = call.client_id().unwrap_or(-1);
            Ok(ScriptValue::Bool(queryable.is_queryable(id)))
        });
        bridge.registry().register(EventKind::ClientConnect, handler.clone());
        bridge.registry().register(EventKind::ClientSpawn, handler);

        // true means "allow"; a closed window would return false and suppress.
        assert_eq!(bridge.dispatch(EventCall::client_connect(3, false)), Verdict::Passthrough);
        assert_eq!(bridge.queryable().current(), None);

        // Spawn does not open a window, and cannot be suppressed either way.
        assert_eq!(bridge.dispatch(EventCall::client_spawn(3)), Verdict::Passthrough);
    }

    #[test]
    fn disconnect_handler_sees_the_query_window() {
        let (bridge, _) = bridge();
        let queryable = bridge.queryable().clone();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let record = seen.clone();
        let handler: FakeHandler = Arc::new(move |call| {
            let id = call.client_id().unwrap_or(-1);
            record.lock().unwrap().push((queryable.is_queryable(id), queryable.is_queryable(id + 1)));
            Ok(ScriptValue::Nil)
        });
        bridge.registry().register(EventKind::ClientDisconnect, handler);

        bridge.dispatch(EventCall::client_disconnect(6, b"disconnected"));
        assert_eq!(*seen.lock().unwrap(), vec![(true, false)]);
        assert_eq!(bridge.queryable().current(), None);
    }

    #[test]
    fn query_window_closes_when_the_handler_fails() {
        let (bridge, sink) = bridge();
        let queryable = bridge.queryable().clone();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let record = seen.clone();
        let handler: FakeHandler = Arc::new(move |call| {
            let id = call.client_id().unwrap_or(-1);
            record.lock().unwrap().push(queryable.is_queryable(id));
            match id {
                1 => Err(EventError::HandlerExecution("raised".into())),
                _ => panic!("handler blew up"),
            }
        });
        bridge.registry().register(EventKind::ClientDisconnect, handler.clone());
        bridge.registry().register(EventKind::ClientConnect, handler);

        assert_eq!(bridge.dispatch(EventCall::client_disconnect(1, b"timed out")), Verdict::Passthrough);
        assert_eq!(bridge.queryable().current(), None);
        assert_eq!(bridge.dispatch(EventCall::client_connect(2, false)), Verdict::Passthrough);
        assert_eq!(bridge.queryable().current(), None);
        assert_eq!(*seen.lock().unwrap(), vec![true, true]);
        assert_eq!(sink.count(), 2);
    }

    #[test]
    fn listening_follows_the_registry() {
        let (bridge, _) = bridge();
        let dispatcher: &dyn Dispatcher = &bridge;
        assert!(!dispatcher.is_listening(EventKind::ConsolePrint));
        bridge.registry().register(EventKind::ConsolePrint, returning(ScriptValue::Nil));
        assert!(dispatcher.is_listening(EventKind::ConsolePrint));
        assert!(!dispatcher.is_listening(EventKind::ServerCommand));
    }

    #[test]
    fn nested_dispatch_passes_through() {
        let (bridge, _) = bridge();
        let bridge = Arc::new(bridge);
        let inner = Arc::downgrade(&bridge);
        let handler: FakeHandler = Arc::new(move |_| {
            let nested = inner
                .upgrade()
                .map(|b| b.dispatch(EventCall::console_print(b"nested\n")));
            assert_eq!(nested, Some(Verdict::Passthrough));
            Ok(ScriptValue::Bool(false))
        });
        bridge.registry().register(EventKind::ConsolePrint, handler);

        assert_eq!(bridge.dispatch(EventCall::console_print(b"outer\n")), Verdict::Suppress);
        let stats = bridge.stats();
        assert_eq!(stats.reentrant_skips, 1);
        assert_eq!(stats.token_acquisitions, stats.token_releases);
    }
}
