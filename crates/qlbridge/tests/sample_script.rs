use bridge_events::{BridgeSettings, CollectingSink, Dispatcher, EventCall, Replacement, Verdict};
use qlbridge::stubs::translate::{self, ConnectAction, BANNED_MESSAGE};
use script_runtime::{ScriptHost, ScriptSettings};
use std::ffi::CString;
use std::path::PathBuf;
use std::sync::Arc;

fn sample_host() -> (ScriptHost, Arc<CollectingSink>) {
    let settings = ScriptSettings {
        directory: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("scripts"),
        ..Default::default()
    };
    let sink = Arc::new(CollectingSink::new());
    let host = ScriptHost::with_sink(settings, BridgeSettings::default(), sink.clone()).unwrap();
    let report = host.load_directory().unwrap();
    assert_eq!(report.loaded, report.discovered);
    assert!(report.failed.is_empty());
    (host, sink)
}

#[test]
fn sample_script_filters_commands() {
    let (host, sink) = sample_host();
    let bridge = host.bridge();

    assert_eq!(bridge.dispatch(EventCall::client_command(1, b"kill")), Verdict::Suppress);
    assert_eq!(
        bridge.dispatch(EventCall::client_command(1, b"say hi")),
        Verdict::Replace(Replacement::Text("say \"hello everyone\"".to_string()))
    );
    assert_eq!(bridge.dispatch(EventCall::client_command(1, b"team s")), Verdict::Passthrough);
    assert_eq!(sink.count(), 0);
}

#[test]
fn rcon_ban_refuses_the_next_connect() {
    let (host, _) = sample_host();
    let bridge: &dyn Dispatcher = &**host.bridge();

    assert_eq!(translate::client_connect(bridge, 5, true, false), ConnectAction::Proceed);
    translate::rcon(bridge, b"ban 5");
    assert_eq!(
        translate::client_connect(bridge, 5, true, false),
        ConnectAction::Refuse(CString::new(BANNED_MESSAGE).unwrap())
    );
    assert_eq!(translate::client_connect(bridge, 6, true, false), ConnectAction::Proceed);

    // A reload forgets the in-memory ban list.
    host.reinitialize().unwrap();
    let bridge: &dyn Dispatcher = &**host.bridge();
    assert_eq!(translate::client_connect(bridge, 5, true, false), ConnectAction::Proceed);
}
