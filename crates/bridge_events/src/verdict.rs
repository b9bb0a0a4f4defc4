//! Turning a handler's return value into what the native side does next.

use crate::error::EventError;
use crate::kind::{EventKind, ReplaceShape};
use crate::think::ThinkInput;
use crate::value::ScriptValue;

#[derive(Debug, Clone, PartialEq)]
pub enum Replacement {
    Text(String),
    Think(ThinkInput),
}

/// What the hooked engine function should do with the event.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Verdict {
    /// Proceed with the original data.
    #[default]
    Passthrough,
    /// Cancel the engine's action.
    Suppress,
    /// Proceed with substituted data.
    Replace(Replacement),
}

impl Verdict {
    pub fn is_passthrough(&self) -> bool {
        matches!(self, Verdict::Passthrough)
    }

    pub fn replacement_text(&self) -> Option<&str> {
        match self {
            Verdict::Replace(Replacement::Text(text)) => Some(text),
            _ => None,
        }
    }
}

/// A failure worth one diagnostic line.
#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    Invocation(EventError),
    Malformed(EventError),
}

impl Fault {
    pub fn error(&self) -> &EventError {
        match self {
            Fault::Invocation(e) | Fault::Malformed(e) => e,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Interpretation {
    pub verdict: Verdict,
    pub fault: Option<Fault>,
}

impl Interpretation {
    fn clean(verdict: Verdict) -> Self {
        Self { verdict, fault: None }
    }
}

/// Cuts `text` to at most `max_len` bytes without splitting a character.
pub fn truncate_text(mut text: String, max_len: usize) -> String {
    if text.len() > max_len {
        let mut cut = max_len;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
    text
}

/// Applies the capability table for `kind` to a handler outcome.
///
/// Failed invocations and values of an unsupported shape become
/// PASSTHROUGH. Only a malformed think record is reported as a fault; other
/// unexpected values are simply "no opinion".
pub fn interpret(
    kind: EventKind,
    outcome: Result<ScriptValue, EventError>,
    max_text_len: usize,
) -> Interpretation {
    let value = match outcome {
        Ok(value) => value,
        Err(e) => {
            return Interpretation {
                verdict: Verdict::Passthrough,
                fault: Some(Fault::Invocation(e)),
            }
        }
    };

    let caps = kind.capabilities();
    match (value, caps.replace) {
        (ScriptValue::Bool(false), _) if caps.suppress => Interpretation::clean(Verdict::Suppress),
        (ScriptValue::Text(text), ReplaceShape::Text) => Interpretation::clean(Verdict::Replace(
            Replacement::Text(truncate_text(text, max_text_len)),
        )),
        (ScriptValue::Record(record), ReplaceShape::Think) => match ThinkInput::from_record(&record) {
            Ok(input) => Interpretation::clean(Verdict::Replace(Replacement::Think(input))),
            Err(reason) => Interpretation {
                verdict: Verdict::Passthrough,
                fault: Some(Fault::Malformed(EventError::MalformedResult { kind, reason })),
            },
        },
        _ => Interpretation::clean(Verdict::Passthrough),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: usize = 4095;

    #[test]
    fn false_suppresses_only_gating_events() {
        let gate = interpret(EventKind::ClientCommand, Ok(ScriptValue::Bool(false)), MAX);
        assert_eq!(gate.verdict, Verdict::Suppress);

        let notify = interpret(EventKind::ClientDisconnect, Ok(ScriptValue::Bool(false)), MAX);
        assert_eq!(notify.verdict, Verdict::Passthrough);
        assert!(notify.fault.is_none());
    }

    #[test]
    fn true_and_nil_mean_no_opinion() {
        for value in [ScriptValue::Bool(true), ScriptValue::Nil, ScriptValue::Integer(0)] {
            let i = interpret(EventKind::ServerCommand, Ok(value), MAX);
            assert_eq!(i.verdict, Verdict::Passthrough);
        }
    }

    #[test]
    fn text_replaces_where_supported() {
        let i = interpret(EventKind::ConsolePrint, Ok(ScriptValue::Text("hidden\n".into())), MAX);
        assert_eq!(i.verdict.replacement_text(), Some("hidden\n"));

        let downgraded = interpret(EventKind::Frame, Ok(ScriptValue::Text("x".into())), MAX);
        assert_eq!(downgraded.verdict, Verdict::Passthrough);
    }

    #[test]
    fn long_text_is_cut_on_a_char_boundary() {
        assert_eq!(truncate_text("a".repeat(5000), MAX).len(), MAX);
        // 'é' is two bytes; cutting at 3 would split the second one.
        assert_eq!(truncate_text("éé".to_string(), 3), "é");
        assert_eq!(truncate_text("short".to_string(), MAX), "short");
    }

    #[test]
    fn think_record_replaces_input() {
        let input = ThinkInput {
            server_time: 1000,
            yaw: 90.0,
            fov: 110,
            ..Default::default()
        };
        let i = interpret(EventKind::ClientThink, Ok(ScriptValue::Record(input.to_record())), MAX);
        assert_eq!(i.verdict, Verdict::Replace(Replacement::Think(input)));
    }

    #[test]
    fn bad_think_record_is_a_fault() {
        let mut record = ThinkInput::default().to_record();
        record.remove("fov");
        let i = interpret(EventKind::ClientThink, Ok(ScriptValue::Record(record)), MAX);

        assert_eq!(i.verdict, Verdict::Passthrough);
        match i.fault {
            Some(Fault::Malformed(EventError::MalformedResult { reason, .. })) => {
                assert_eq!(reason, "missing field 'fov'")
            }
            other => panic!("unexpected fault {other:?}"),
        }
    }

    #[test]
    fn failed_invocation_passes_through() {
        let i = interpret(
            EventKind::ClientConnect,
            Err(EventError::HandlerExecution("boom".into())),
            MAX,
        );
        assert_eq!(i.verdict, Verdict::Passthrough);
        assert!(matches!(i.fault, Some(Fault::Invocation(_))));
    }
}
