// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Physical execution devices.

use std::fmt;
use std::str::FromStr;

/// Identifies the device a tensor or operator lives on.
///
/// `Place` is the key of every per-device map in the engine (scopes,
/// garbage collectors, reference-count tables, device contexts), so it is
/// `Copy + Eq + Hash + Ord`.
///
/// # Parsing
/// ```
/// use tensor_core::Place;
///
/// assert_eq!("cpu".parse::<Place>().unwrap(), Place::Cpu);
/// assert_eq!("accel:1".parse::<Place>().unwrap(), Place::Accel(1));
/// assert_eq!("gpu:0".parse::<Place>().unwrap(), Place::Accel(0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Place {
    /// Host memory / CPU execution.
    Cpu,
    /// An accelerator with the given device index.
    Accel(usize),
}

impl Place {
    /// Returns `true` for [`Place::Cpu`].
    pub fn is_cpu(&self) -> bool {
        matches!(self, Place::Cpu)
    }

    /// Returns `true` for any accelerator place.
    pub fn is_accel(&self) -> bool {
        matches!(self, Place::Accel(_))
    }

    /// Returns the accelerator index, or `None` for the CPU.
    pub fn device_index(&self) -> Option<usize> {
        match self {
            Place::Cpu => None,
            Place::Accel(i) => Some(*i),
        }
    }
}

impl fmt::Display for Place {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Place::Cpu => f.write_str("cpu"),
            Place::Accel(i) => write!(f, "accel:{i}"),
        }
    }
}

impl FromStr for Place {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        if lower == "cpu" {
            return Ok(Place::Cpu);
        }
        let (kind, index) = lower
            .split_once(':')
            .ok_or_else(|| format!("invalid place '{s}'; expected 'cpu' or 'accel:N'"))?;
        match kind {
            "accel" | "gpu" | "cuda" => index
                .parse::<usize>()
                .map(Place::Accel)
                .map_err(|_| format!("invalid device index in place '{s}'")),
            _ => Err(format!("unknown device kind '{kind}' in place '{s}'")),
        }
    }
}

impl TryFrom<String> for Place {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Place> for String {
    fn from(place: Place) -> Self {
        place.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        for s in ["cpu", "accel:0", "accel:7"] {
            let p: Place = s.parse().unwrap();
            assert_eq!(p.to_string(), s);
        }
        assert_eq!("CUDA:2".parse::<Place>().unwrap(), Place::Accel(2));
    }

    #[test]
    fn test_parse_invalid() {
        assert!("tpu:0".parse::<Place>().is_err());
        assert!("accel:x".parse::<Place>().is_err());
        assert!("accel".parse::<Place>().is_err());
    }

    #[test]
    fn test_kind_predicates() {
        assert!(Place::Cpu.is_cpu());
        assert!(!Place::Cpu.is_accel());
        assert_eq!(Place::Accel(3).device_index(), Some(3));
        assert_eq!(Place::Cpu.device_index(), None);
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&vec![Place::Cpu, Place::Accel(1)]).unwrap();
        assert_eq!(json, r#"["cpu","accel:1"]"#);
        let back: Vec<Place> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, vec![Place::Cpu, Place::Accel(1)]);
    }
}
