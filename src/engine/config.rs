//! The engine's configuration registry.
//
//  This Source Code Form is subject to the terms of the Mozilla Public
//  License, v. 2.0. If a copy of the MPL was not distributed with this
//  file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
////////////////////////////////////////////////////////////////////////////////////////////////////
use std::fmt;

/// Option name: hard cap on iteration depth (0 = unlimited).
pub const MAX_DEPTH: &str = "limits/maxDepth";
/// Option name: transposition table budget, in MiB.
pub const MAX_MEMORY: &str = "limits/maxMemory";
/// Option name: best-effort cap on search nodes (0 = unlimited).
pub const MAX_NODES: &str = "limits/maxNodes";
/// Option name: target searcher-pool size.
pub const MAX_THREADS: &str = "limits/maxThreads";
/// Option name: shuffle piece lists on new game for move-ordering variety.
pub const RANDOM_MOVES: &str = "randomMoves";
/// Option name: may the engine resign lost positions?
pub const CAN_RESIGN: &str = "canResign";
/// Option name: the history-heuristic window, in moves (0 disables; 1 is killers only).
pub const HISTORY_WINDOW: &str = "historyWindow";

////////////////////////////////////////////////////////////////////////////////////////////////////
/// One configurable option. A small tagged enum dispatched by discriminant; no trait hierarchy
/// needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigItem {
    /// A boolean switch.
    Checkbox {
        /// Current value.
        value: bool,
    },
    /// An integer in an inclusive range.
    Spin {
        /// Current value.
        value: i64,
        /// Smallest allowed value.
        min: i64,
        /// Largest allowed value.
        max: i64,
    },
    /// One string from a fixed set of choices.
    Combo {
        /// Current value, always one of `choices`.
        value: String,
        /// The allowed values.
        choices: Vec<String>,
    },
    /// A stateless action.
    Button,
    /// Free-form text.
    String {
        /// Current value.
        value: String,
    },
}

/// Errors from the config API, returned synchronously to the caller.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No option with that name is registered.
    NotFound,
    /// The option exists but has a different variant.
    WrongType,
    /// The value is outside the option's allowed range or choices.
    InvalidValue,
    /// An option with that name is already registered.
    AlreadyExists,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NotFound => "no such option".fmt(f),
            ConfigError::WrongType => "wrong option type".fmt(f),
            ConfigError::InvalidValue => "value out of range".fmt(f),
            ConfigError::AlreadyExists => "option already registered".fmt(f),
        }
    }
}

impl std::error::Error for ConfigError { }

////////////////////////////////////////////////////////////////////////////////////////////////////
/// An ordered registry of options.
#[derive(Debug, Clone, Default)]
pub struct Config {
    items: Vec<(String, ConfigItem)>,
}

impl Config {
    /// Creates an empty registry.
    pub fn new() -> Config {
        Config { items: Vec::new() }
    }

    /// Registers a new option under `name`.
    pub fn register(&mut self, name: &str, item: ConfigItem) -> Result<(), ConfigError> {
        if self.find(name).is_some() {
            return Err(ConfigError::AlreadyExists);
        }
        if let ConfigItem::Spin { value, min, max } = item {
            if value < min || value > max {
                return Err(ConfigError::InvalidValue);
            }
        }
        self.items.push((name.to_owned(), item));
        Ok(())
    }

    fn find(&self, name: &str) -> Option<usize> {
        self.items.iter().position(|(n, _)| n == name)
    }

    /// Looks an option up by name.
    pub fn get(&self, name: &str) -> Result<&ConfigItem, ConfigError> {
        self.find(name).map(|i| &self.items[i].1).ok_or(ConfigError::NotFound)
    }

    /// Iterates over all registered options, in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigItem)> {
        self.items.iter().map(|(n, i)| (n.as_str(), i))
    }

    /// Reads a checkbox.
    pub fn checkbox(&self, name: &str) -> Result<bool, ConfigError> {
        match self.get(name)? {
            ConfigItem::Checkbox { value } => Ok(*value),
            _ => Err(ConfigError::WrongType),
        }
    }

    /// Reads a spin value.
    pub fn spin(&self, name: &str) -> Result<i64, ConfigError> {
        match self.get(name)? {
            ConfigItem::Spin { value, .. } => Ok(*value),
            _ => Err(ConfigError::WrongType),
        }
    }

    /// Sets a checkbox.
    pub fn set_checkbox(&mut self, name: &str, new_value: bool) -> Result<(), ConfigError> {
        let idx = self.find(name).ok_or(ConfigError::NotFound)?;
        match &mut self.items[idx].1 {
            ConfigItem::Checkbox { value } => {
                *value = new_value;
                Ok(())
            }
            _ => Err(ConfigError::WrongType),
        }
    }

    /// Sets a spin value, enforcing its range.
    pub fn set_spin(&mut self, name: &str, new_value: i64) -> Result<(), ConfigError> {
        let idx = self.find(name).ok_or(ConfigError::NotFound)?;
        match &mut self.items[idx].1 {
            ConfigItem::Spin { value, min, max } => {
                if new_value < *min || new_value > *max {
                    return Err(ConfigError::InvalidValue);
                }
                *value = new_value;
                Ok(())
            }
            _ => Err(ConfigError::WrongType),
        }
    }

    /// Sets a combo, which must be one of its registered choices.
    pub fn set_combo(&mut self, name: &str, new_value: &str) -> Result<(), ConfigError> {
        let idx = self.find(name).ok_or(ConfigError::NotFound)?;
        match &mut self.items[idx].1 {
            ConfigItem::Combo { value, choices } => {
                if !choices.iter().any(|c| c == new_value) {
                    return Err(ConfigError::InvalidValue);
                }
                *value = new_value.to_owned();
                Ok(())
            }
            _ => Err(ConfigError::WrongType),
        }
    }

    /// Sets a string option.
    pub fn set_string(&mut self, name: &str, new_value: &str) -> Result<(), ConfigError> {
        let idx = self.find(name).ok_or(ConfigError::NotFound)?;
        match &mut self.items[idx].1 {
            ConfigItem::String { value } => {
                *value = new_value.to_owned();
                Ok(())
            }
            _ => Err(ConfigError::WrongType),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_and_typed_access() {
        let mut config = Config::new();
        config.register("foo", ConfigItem::Checkbox { value: true }).expect("fresh name");
        config.register("bar", ConfigItem::Spin { value: 5, min: 0, max: 10 })
            .expect("fresh name");

        assert_eq!(config.register("foo", ConfigItem::Button), Err(ConfigError::AlreadyExists));
        assert_eq!(config.checkbox("foo"), Ok(true));
        assert_eq!(config.spin("bar"), Ok(5));
        assert_eq!(config.spin("foo"), Err(ConfigError::WrongType));
        assert_eq!(config.checkbox("missing"), Err(ConfigError::NotFound));
    }

    #[test]
    fn spin_ranges_are_enforced() {
        let mut config = Config::new();
        config.register("n", ConfigItem::Spin { value: 1, min: 1, max: 8 }).expect("fresh");
        assert_eq!(config.set_spin("n", 9), Err(ConfigError::InvalidValue));
        assert_eq!(config.set_spin("n", 8), Ok(()));
        assert_eq!(config.spin("n"), Ok(8));
    }

    #[test]
    fn combo_choices_are_enforced() {
        let mut config = Config::new();
        config.register("style", ConfigItem::Combo {
            value: "solid".into(),
            choices: vec!["solid".into(), "wild".into()],
        }).expect("fresh");
        assert_eq!(config.set_combo("style", "bonkers"), Err(ConfigError::InvalidValue));
        assert_eq!(config.set_combo("style", "wild"), Ok(()));
    }
}
