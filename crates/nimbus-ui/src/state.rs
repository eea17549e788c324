//! Application state model: the fixed set of keys, their values and the
//! topics observers can subscribe to.

use std::fmt;
use std::str::FromStr;

use nimbus_core::{Settings, StateError};
use nimbus_weather::{Coordinates, ThemeMode, Units};

/// One field of [`ApplicationState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StateKey {
    City,
    Language,
    Unit,
    UsingLocation,
    CurrentLat,
    CurrentLon,
    ThemeMode,
    UsingTheme,
}

impl StateKey {
    pub const ALL: [StateKey; 8] = [
        StateKey::City,
        StateKey::Language,
        StateKey::Unit,
        StateKey::UsingLocation,
        StateKey::CurrentLat,
        StateKey::CurrentLon,
        StateKey::ThemeMode,
        StateKey::UsingTheme,
    ];

    /// Name used by views when registering by string
    pub fn name(self) -> &'static str {
        match self {
            StateKey::City => "city",
            StateKey::Language => "language",
            StateKey::Unit => "unit",
            StateKey::UsingLocation => "usingLocation",
            StateKey::CurrentLat => "currentLat",
            StateKey::CurrentLon => "currentLon",
            StateKey::ThemeMode => "themeMode",
            StateKey::UsingTheme => "usingTheme",
        }
    }

    fn expected(self) -> &'static str {
        match self {
            StateKey::City | StateKey::Language => "text",
            StateKey::Unit => "a unit system",
            StateKey::UsingLocation | StateKey::UsingTheme => "a flag",
            StateKey::CurrentLat | StateKey::CurrentLon => "optional degrees",
            StateKey::ThemeMode => "a theme mode",
        }
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StateKey {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StateKey::ALL
            .into_iter()
            .find(|key| key.name() == s)
            .ok_or_else(|| StateError::UnknownKey(s.to_string()))
    }
}

/// Notifications that carry a value but don't correspond to a stored field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BroadcastEvent {
    Theme,
    Language,
}

impl BroadcastEvent {
    pub fn name(self) -> &'static str {
        match self {
            BroadcastEvent::Theme => "theme_event",
            BroadcastEvent::Language => "language_event",
        }
    }
}

/// What an observer subscribes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Field(StateKey),
    Event(BroadcastEvent),
}

impl From<StateKey> for Topic {
    fn from(key: StateKey) -> Self {
        Topic::Field(key)
    }
}

impl From<BroadcastEvent> for Topic {
    fn from(event: BroadcastEvent) -> Self {
        Topic::Event(event)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Field(key) => f.write_str(key.name()),
            Topic::Event(event) => f.write_str(event.name()),
        }
    }
}

impl FromStr for Topic {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "theme_event" => Ok(Topic::Event(BroadcastEvent::Theme)),
            "language_event" => Ok(Topic::Event(BroadcastEvent::Language)),
            other => other.parse::<StateKey>().map(Topic::Field),
        }
    }
}

/// A value held by the store or carried by a notification
#[derive(Debug, Clone)]
pub enum StateValue {
    Text(String),
    Units(Units),
    Flag(bool),
    Degrees(Option<f64>),
    Theme(ThemeMode),
}

impl StateValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            StateValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_units(&self) -> Option<Units> {
        match self {
            StateValue::Units(u) => Some(*u),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            StateValue::Flag(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_degrees(&self) -> Option<Option<f64>> {
        match self {
            StateValue::Degrees(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_theme(&self) -> Option<ThemeMode> {
        match self {
            StateValue::Theme(t) => Some(*t),
            _ => None,
        }
    }
}

impl PartialEq for StateValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (StateValue::Text(a), StateValue::Text(b)) => a == b,
            (StateValue::Units(a), StateValue::Units(b)) => a == b,
            (StateValue::Flag(a), StateValue::Flag(b)) => a == b,
            (StateValue::Degrees(a), StateValue::Degrees(b)) => same_degrees(*a, *b),
            (StateValue::Theme(a), StateValue::Theme(b)) => a == b,
            _ => false,
        }
    }
}

/// Bitwise comparison, so writing the same NaN twice is not a change
fn same_degrees(a: Option<f64>, b: Option<f64>) -> bool {
    a.map(f64::to_bits) == b.map(f64::to_bits)
}

impl From<String> for StateValue {
    fn from(value: String) -> Self {
        StateValue::Text(value)
    }
}

impl From<&str> for StateValue {
    fn from(value: &str) -> Self {
        StateValue::Text(value.to_string())
    }
}

impl From<Units> for StateValue {
    fn from(value: Units) -> Self {
        StateValue::Units(value)
    }
}

impl From<bool> for StateValue {
    fn from(value: bool) -> Self {
        StateValue::Flag(value)
    }
}

impl From<Option<f64>> for StateValue {
    fn from(value: Option<f64>) -> Self {
        StateValue::Degrees(value)
    }
}

impl From<ThemeMode> for StateValue {
    fn from(value: ThemeMode) -> Self {
        StateValue::Theme(value)
    }
}

/// Shared application state.
///
/// The key set is fixed by the struct; only values change, and only through
/// [`crate::StateStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationState {
    city: String,
    language: String,
    unit: Units,
    using_location: bool,
    current_lat: Option<f64>,
    current_lon: Option<f64>,
    theme_mode: ThemeMode,
    using_theme: bool,
}

impl Default for ApplicationState {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl ApplicationState {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            city: settings.last_city.clone(),
            language: settings.language.clone(),
            unit: settings.unit,
            using_location: settings.using_location,
            current_lat: None,
            current_lon: None,
            theme_mode: settings.theme_mode,
            using_theme: settings.theme_mode.is_dark(),
        }
    }

    /// The persisted subset of this state
    pub fn to_settings(&self) -> Settings {
        Settings {
            theme_mode: self.theme_mode,
            language: self.language.clone(),
            unit: self.unit,
            last_city: self.city.clone(),
            using_location: self.using_location,
        }
    }

    pub fn get(&self, key: StateKey) -> StateValue {
        match key {
            StateKey::City => StateValue::Text(self.city.clone()),
            StateKey::Language => StateValue::Text(self.language.clone()),
            StateKey::Unit => StateValue::Units(self.unit),
            StateKey::UsingLocation => StateValue::Flag(self.using_location),
            StateKey::CurrentLat => StateValue::Degrees(self.current_lat),
            StateKey::CurrentLon => StateValue::Degrees(self.current_lon),
            StateKey::ThemeMode => StateValue::Theme(self.theme_mode),
            StateKey::UsingTheme => StateValue::Flag(self.using_theme),
        }
    }

    /// Write `value` into `key`. Returns whether the stored value changed.
    pub(crate) fn apply(&mut self, key: StateKey, value: StateValue) -> Result<bool, StateError> {
        fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
            if *slot == value {
                false
            } else {
                *slot = value;
                true
            }
        }

        fn replace_degrees(slot: &mut Option<f64>, value: Option<f64>) -> bool {
            if same_degrees(*slot, value) {
                false
            } else {
                *slot = value;
                true
            }
        }

        let changed = match (key, value) {
            (StateKey::City, StateValue::Text(v)) => replace(&mut self.city, v),
            (StateKey::Language, StateValue::Text(v)) => replace(&mut self.language, v),
            (StateKey::Unit, StateValue::Units(v)) => replace(&mut self.unit, v),
            (StateKey::UsingLocation, StateValue::Flag(v)) => replace(&mut self.using_location, v),
            (StateKey::CurrentLat, StateValue::Degrees(v)) => {
                replace_degrees(&mut self.current_lat, v)
            }
            (StateKey::CurrentLon, StateValue::Degrees(v)) => {
                replace_degrees(&mut self.current_lon, v)
            }
            (StateKey::ThemeMode, StateValue::Theme(v)) => replace(&mut self.theme_mode, v),
            (StateKey::UsingTheme, StateValue::Flag(v)) => replace(&mut self.using_theme, v),
            (key, _) => {
                return Err(StateError::TypeMismatch {
                    key: key.name().to_string(),
                    expected: key.expected(),
                })
            }
        };
        Ok(changed)
    }

    pub fn city(&self) -> &str {
        &self.city
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn unit(&self) -> Units {
        self.unit
    }

    pub fn using_location(&self) -> bool {
        self.using_location
    }

    pub fn theme_mode(&self) -> ThemeMode {
        self.theme_mode
    }

    pub fn using_theme(&self) -> bool {
        self.using_theme
    }

    /// Last stored coordinates, when both components are present
    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.current_lat, self.current_lon) {
            (Some(lat), Some(lon)) => Some(Coordinates::new(lat, lon)),
            _ => None,
        }
    }
}
