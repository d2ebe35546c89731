//! OGC service, operation and rule enumerations.
//!
//! # Design Decisions
//! - Parsing is case-insensitive (clients send `getmap`, `GETMAP`, ...)
//! - Serialization uses the canonical spelling (`GetMap`, `WMS`, `REQUEST`)
//! - Operation sets per service are fixed, ordered arrays

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when a string does not name a known enumeration value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {kind} '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Implements `Display`, `FromStr` and string-based serde for a unit enum.
macro_rules! string_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// All values in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Canonical wire spelling.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.trim();
                $name::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str().eq_ignore_ascii_case(s))
                    .ok_or_else(|| ParseEnumError::new($kind, s))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

/// OGC service type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ServiceType {
    Wms,
    Wfs,
    Wcs,
    Wps,
    W3ds,
}

string_enum!(ServiceType, "service", {
    Wms => "WMS",
    Wfs => "WFS",
    Wcs => "WCS",
    Wps => "WPS",
    W3ds => "W3DS",
});

/// OGC operation (the `REQUEST` parameter or the XML root element).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperationType {
    GetCapabilities,
    GetMap,
    GetFeatureInfo,
    DescribeLayer,
    GetLegendGraphic,
    GetStyles,
    DescribeFeatureType,
    GetFeature,
    LockFeature,
    Transaction,
    DescribeCoverage,
    GetCoverage,
    Execute,
    DescribeProcess,
    GetScene,
    GetLayerInfo,
    GetTile,
}

string_enum!(OperationType, "operation", {
    GetCapabilities => "GetCapabilities",
    GetMap => "GetMap",
    GetFeatureInfo => "GetFeatureInfo",
    DescribeLayer => "DescribeLayer",
    GetLegendGraphic => "GetLegendGraphic",
    GetStyles => "GetStyles",
    DescribeFeatureType => "DescribeFeatureType",
    GetFeature => "GetFeature",
    LockFeature => "LockFeature",
    Transaction => "Transaction",
    DescribeCoverage => "DescribeCoverage",
    GetCoverage => "GetCoverage",
    Execute => "Execute",
    DescribeProcess => "DescribeProcess",
    GetScene => "GetScene",
    GetLayerInfo => "GetLayerInfo",
    GetTile => "GetTile",
});

/// Which leg of the call a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    Request,
    Response,
}

string_enum!(Direction, "direction", {
    Request => "REQUEST",
    Response => "RESPONSE",
});

/// What a matching rule does with the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RuleType {
    Allow,
    Deny,
    Modify,
}

string_enum!(RuleType, "rule type", {
    Allow => "ALLOW",
    Deny => "DENY",
    Modify => "MODIFY",
});

impl RuleType {
    /// Tie-break weight between rules of equal specificity (higher wins).
    pub fn precedence(&self) -> u8 {
        match self {
            RuleType::Deny => 2,
            RuleType::Modify => 1,
            RuleType::Allow => 0,
        }
    }
}

const WMS_OPERATIONS: &[OperationType] = &[
    OperationType::GetCapabilities,
    OperationType::GetMap,
    OperationType::GetFeatureInfo,
    OperationType::DescribeLayer,
    OperationType::GetLegendGraphic,
    OperationType::GetStyles,
];

const WFS_OPERATIONS: &[OperationType] = &[
    OperationType::GetCapabilities,
    OperationType::DescribeFeatureType,
    OperationType::GetFeature,
    OperationType::LockFeature,
    OperationType::Transaction,
];

const WCS_OPERATIONS: &[OperationType] = &[
    OperationType::GetCapabilities,
    OperationType::DescribeCoverage,
    OperationType::GetCoverage,
];

const WPS_OPERATIONS: &[OperationType] = &[
    OperationType::GetCapabilities,
    OperationType::DescribeProcess,
    OperationType::Execute,
];

const W3DS_OPERATIONS: &[OperationType] = &[
    OperationType::GetCapabilities,
    OperationType::GetScene,
    OperationType::GetFeatureInfo,
    OperationType::GetLayerInfo,
    OperationType::GetTile,
];

impl ServiceType {
    /// The fixed operation set of this service.
    pub fn operations(&self) -> &'static [OperationType] {
        match self {
            ServiceType::Wms => WMS_OPERATIONS,
            ServiceType::Wfs => WFS_OPERATIONS,
            ServiceType::Wcs => WCS_OPERATIONS,
            ServiceType::Wps => WPS_OPERATIONS,
            ServiceType::W3ds => W3DS_OPERATIONS,
        }
    }

    pub fn supports(&self, operation: OperationType) -> bool {
        self.operations().contains(&operation)
    }
}

/// All services offering `operation`.
pub fn services_for(operation: OperationType) -> Vec<ServiceType> {
    ServiceType::ALL
        .iter()
        .copied()
        .filter(|s| s.supports(operation))
        .collect()
}

/// The service implied by `operation`, if exactly one service offers it.
pub fn infer_service(operation: OperationType) -> Option<ServiceType> {
    match services_for(operation).as_slice() {
        [only] => Some(*only),
        _ => None,
    }
}
