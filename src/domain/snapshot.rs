// Snapshot domain model - persisted absent sets carried between runs
use crate::domain::coverage::{EngineeringStreamKey, InstrumentKey, MethodKey, ParameterKey, StreamKey};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Parameter,
    Stream,
    Method,
    Instrument,
    EngineeringStream,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parameter => "param",
            Self::Stream => "stream",
            Self::Method => "method",
            Self::Instrument => "refdes",
            Self::EngineeringStream => "engineering_stream",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A de-duplicated key set tagged with its level
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "level", content = "keys", rename_all = "snake_case")]
pub enum LevelKeys {
    Parameter(BTreeSet<ParameterKey>),
    Stream(BTreeSet<StreamKey>),
    Method(BTreeSet<MethodKey>),
    Instrument(BTreeSet<InstrumentKey>),
    EngineeringStream(BTreeSet<EngineeringStreamKey>),
}

impl LevelKeys {
    pub fn level(&self) -> Level {
        match self {
            Self::Parameter(_) => Level::Parameter,
            Self::Stream(_) => Level::Stream,
            Self::Method(_) => Level::Method,
            Self::Instrument(_) => Level::Instrument,
            Self::EngineeringStream(_) => Level::EngineeringStream,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Parameter(keys) => keys.len(),
            Self::Stream(keys) => keys.len(),
            Self::Method(keys) => keys.len(),
            Self::Instrument(keys) => keys.len(),
            Self::EngineeringStream(keys) => keys.len(),
        }
    }
}

/// Key type of one rollup level
pub trait LevelKey: Ord + Clone + fmt::Debug + Send + Sync + 'static {
    const LEVEL: Level;

    fn refdes(&self) -> &str;

    fn wrap(keys: BTreeSet<Self>) -> LevelKeys;

    /// `None` when the keys belong to another level
    fn unwrap(keys: LevelKeys) -> Option<BTreeSet<Self>>;
}

macro_rules! level_key {
    ($key:ty, $variant:ident) => {
        impl LevelKey for $key {
            const LEVEL: Level = Level::$variant;

            fn refdes(&self) -> &str {
                &self.refdes
            }

            fn wrap(keys: BTreeSet<Self>) -> LevelKeys {
                LevelKeys::$variant(keys)
            }

            fn unwrap(keys: LevelKeys) -> Option<BTreeSet<Self>> {
                match keys {
                    LevelKeys::$variant(keys) => Some(keys),
                    _ => None,
                }
            }
        }
    };
}

level_key!(ParameterKey, Parameter);
level_key!(StreamKey, Stream);
level_key!(MethodKey, Method);
level_key!(InstrumentKey, Instrument);

impl LevelKey for EngineeringStreamKey {
    const LEVEL: Level = Level::EngineeringStream;

    fn refdes(&self) -> &str {
        &self.0.refdes
    }

    fn wrap(keys: BTreeSet<Self>) -> LevelKeys {
        LevelKeys::EngineeringStream(keys)
    }

    fn unwrap(keys: LevelKeys) -> Option<BTreeSet<Self>> {
        match keys {
            LevelKeys::EngineeringStream(keys) => Some(keys),
            _ => None,
        }
    }
}

/// One level's absent set for one array and calendar date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub array: String,
    pub date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub keys: LevelKeys,
}

impl Snapshot {
    pub fn new<K: LevelKey>(
        array: impl Into<String>,
        date: NaiveDate,
        created_at: DateTime<Utc>,
        keys: BTreeSet<K>,
    ) -> Self {
        Self {
            array: array.into(),
            date,
            created_at,
            keys: K::wrap(keys),
        }
    }

    pub fn level(&self) -> Level {
        self.keys.level()
    }
}
