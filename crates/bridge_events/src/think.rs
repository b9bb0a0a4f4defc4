//! Per-client input, in the units handlers see.

use crate::call::EventArg;
use crate::value::ScriptValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One client's movement command for a server frame.
///
/// Angles are in degrees; the engine's 16-bit angle encoding is converted at
/// the native boundary.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ThinkInput {
    pub server_time: i32,
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
    pub buttons: i32,
    pub weapon: u8,
    pub weapon_primary: u8,
    pub fov: u8,
    pub forwardmove: i8,
    pub rightmove: i8,
    pub upmove: i8,
}

impl ThinkInput {
    /// Field names a replacement record must contain, no more, no less.
    pub const FIELDS: [&'static str; 11] = [
        "server_time",
        "pitch",
        "yaw",
        "roll",
        "buttons",
        "weapon",
        "weapon_primary",
        "fov",
        "forwardmove",
        "rightmove",
        "upmove",
    ];

    pub(crate) fn to_args(self) -> Vec<EventArg> {
        vec![
            EventArg::Int(self.server_time.into()),
            EventArg::Number(self.pitch.into()),
            EventArg::Number(self.yaw.into()),
            EventArg::Number(self.roll.into()),
            EventArg::Int(self.buttons.into()),
            EventArg::Int(self.weapon.into()),
            EventArg::Int(self.weapon_primary.into()),
            EventArg::Int(self.fov.into()),
            EventArg::Int(self.forwardmove.into()),
            EventArg::Int(self.rightmove.into()),
            EventArg::Int(self.upmove.into()),
        ]
    }

    #[cfg(test)]
    pub(crate) fn to_record(self) -> BTreeMap<String, ScriptValue> {
        Self::FIELDS
            .iter()
            .zip(self.to_args())
            .map(|(name, arg)| {
                let value = match arg {
                    EventArg::Int(i) => ScriptValue::Integer(i),
                    EventArg::Number(n) => ScriptValue::Number(n),
                    other => unreachable!("think args are numeric, got {other:?}"),
                };
                (name.to_string(), value)
            })
            .collect()
    }

    /// Validates a handler-returned record and converts it.
    pub fn from_record(record: &BTreeMap<String, ScriptValue>) -> Result<Self, String> {
        if let Some(extra) = record.keys().find(|k| !Self::FIELDS.contains(&k.as_str())) {
            return Err(format!("unexpected field '{extra}'"));
        }
        let field = |name: &str| record.get(name).ok_or_else(|| format!("missing field '{name}'"));

        let angle = |name: &str| -> Result<f32, String> {
            field(name)?
                .as_number()
                .map(|n| n as f32)
                .ok_or_else(|| format!("field '{name}' must be a number"))
        };

        fn int<T: TryFrom<i64>>(record: &BTreeMap<String, ScriptValue>, name: &str) -> Result<T, String> {
            let value = record.get(name).ok_or_else(|| format!("missing field '{name}'"))?;
            let raw = value
                .as_integer()
                .ok_or_else(|| format!("field '{name}' must be an integer, got {}", value.type_name()))?;
            T::try_from(raw).map_err(|_| format!("field '{name}' out of range: {raw}"))
        }

        Ok(Self {
            server_time: int(record, "server_time")?,
            pitch: angle("pitch")?,
            yaw: angle("yaw")?,
            roll: angle("roll")?,
            buttons: int(record, "buttons")?,
            weapon: int(record, "weapon")?,
            weapon_primary: int(record, "weapon_primary")?,
            fov: int(record, "fov")?,
            forwardmove: int(record, "forwardmove")?,
            rightmove: int(record, "rightmove")?,
            upmove: int(record, "upmove")?,
        })
    }
}
