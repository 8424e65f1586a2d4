use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error returned when a symbol does not name a variant of a closed enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownSymbol {
    pub kind: &'static str,
    pub symbol: String,
}

impl fmt::Display for UnknownSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} symbol '{}'", self.kind, self.symbol)
    }
}

impl std::error::Error for UnknownSymbol {}

/// Declares a closed enum whose variants map 1:1 onto upper-case symbols.
///
/// The declaration order is the Avro enum order, so `index()` doubles as the
/// Avro symbol index.
macro_rules! symbol_enum {
    ($(#[$meta:meta])* $name:ident, $kind:literal { $($variant:ident => $symbol:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $symbol)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $symbol),+
                }
            }

            pub fn index(self) -> u32 {
                Self::ALL.iter().position(|v| *v == self).unwrap_or_default() as u32
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownSymbol;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($symbol => Ok($name::$variant),)+
                    other => Err(UnknownSymbol {
                        kind: $kind,
                        symbol: other.to_string(),
                    }),
                }
            }
        }
    };
}

symbol_enum!(
    /// Kind of device registered on a hub.
    DeviceType, "device type" {
        MotionSensor => "MOTION_SENSOR",
        TemperatureSensor => "TEMPERATURE_SENSOR",
        LightSensor => "LIGHT_SENSOR",
        ClimateSensor => "CLIMATE_SENSOR",
        SwitchSensor => "SWITCH_SENSOR",
    }
);

symbol_enum!(
    /// Sensor reading a scenario condition observes.
    ConditionType, "condition type" {
        Motion => "MOTION",
        Luminosity => "LUMINOSITY",
        Switch => "SWITCH",
        Temperature => "TEMPERATURE",
        Co2Level => "CO2LEVEL",
        Humidity => "HUMIDITY",
    }
);

symbol_enum!(
    /// Comparison applied between the reading and the condition value.
    ConditionOperation, "condition operation" {
        Equals => "EQUALS",
        GreaterThan => "GREATER_THAN",
        LowerThan => "LOWER_THAN",
    }
);

symbol_enum!(
    /// Effect a scenario action has on a device.
    ActionType, "action type" {
        Activate => "ACTIVATE",
        Deactivate => "DEACTIVATE",
        Inverse => "INVERSE",
        SetValue => "SET_VALUE",
    }
);
