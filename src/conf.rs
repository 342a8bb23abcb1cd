/* Copyright (C) 2017-2024 Open Information Security Foundation
 *
 * You can copy, redistribute or modify this Program under the terms of
 * the GNU General Public License version 2 as published by the Free
 * Software Foundation.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * version 2 along with this program; if not, write to the Free Software
 * Foundation, Inc., 51 Franklin Street, Fifth Floor, Boston, MA
 * 02110-1301, USA.
 */

//! SMB engine configuration.
//!
//! The configuration is a YAML document with an `smb` mapping:
//!
//! ```yaml
//! smb:
//!   policy: winxp
//!   max-chain: 3
//!   invalid-shares: ["C$", "ADMIN$"]
//!   fingerprint:
//!     client: no
//!     server: yes
//!   memcap: 100mb
//!   max-outstanding: 10
//!   disabled-events: [deprecated_command]
//! ```

use nom7::{
    character::complete::{multispace0, not_line_ending},
    sequence::{preceded, tuple},
    number::complete::double,
    combinator::verify,
    IResult,
};
use thiserror::Error;
use yaml_rust::{Yaml, YamlLoader};

use crate::applayer::AppLayerEvent;
use crate::smb::events::SMBEvent;
use crate::smb::policy::Policy;

pub const SMB_DEFAULT_MAX_CHAIN: u8 = 3;
pub const SMB_DEFAULT_MEMCAP: u64 = 100 * MEGABYTE;
pub const SMB_DEFAULT_MAX_OUTSTANDING: u16 = 10;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("yaml parse: {0}")]
    Yaml(String),
    #[error("unknown policy {0:?}")]
    UnknownPolicy(String),
    #[error("unknown event {0:?}")]
    UnknownEvent(String),
    #[error("invalid memory value {value:?}: {reason}")]
    InvalidMemval { value: String, reason: &'static str },
    #[error("invalid value for {0}")]
    InvalidValue(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SMBConfig {
    /// Policy used until the server is fingerprinted.
    pub policy: Policy,
    /// Number of chained commands that raise the excessive chaining
    /// alert. 0 disables it.
    pub max_chain: u8,
    /// Share names that raise the invalid share alert, upper case.
    pub invalid_shares: Vec<String>,
    pub fp_client: bool,
    pub fp_server: bool,
    pub memcap: u64,
    /// Outstanding request limit until Negotiate tells us otherwise.
    pub max_outstanding: u16,
    pub disabled_events: Vec<SMBEvent>,
}

impl Default for SMBConfig {
    fn default() -> Self {
        SMBConfig {
            policy: Policy::WinXP,
            max_chain: SMB_DEFAULT_MAX_CHAIN,
            invalid_shares: Vec::new(),
            fp_client: false,
            fp_server: true,
            memcap: SMB_DEFAULT_MEMCAP,
            max_outstanding: SMB_DEFAULT_MAX_OUTSTANDING,
            disabled_events: Vec::new(),
        }
    }
}

impl SMBConfig {
    /// Load from a YAML document holding an `smb` mapping. A document
    /// without one gives the defaults.
    pub fn from_yaml_str(s: &str) -> Result<SMBConfig, ConfigError> {
        let docs = YamlLoader::load_from_str(s).map_err(|e| ConfigError::Yaml(e.to_string()))?;
        match docs.first() {
            Some(doc) => SMBConfig::from_yaml(&doc["smb"]),
            None => Ok(SMBConfig::default()),
        }
    }

    /// Load from the `smb` node itself.
    pub fn from_yaml(node: &Yaml) -> Result<SMBConfig, ConfigError> {
        let mut config = SMBConfig::default();
        if node.is_badvalue() || node.is_null() {
            return Ok(config);
        }

        if let Some(name) = yaml_string(&node["policy"]) {
            config.policy = Policy::from_name(&name).ok_or(ConfigError::UnknownPolicy(name))?;
        }

        match &node["max-chain"] {
            Yaml::BadValue => {}
            Yaml::Integer(v) if *v >= 0 && *v <= u8::MAX as i64 => {
                config.max_chain = *v as u8;
            }
            _ => return Err(ConfigError::InvalidValue("max-chain")),
        }

        match &node["invalid-shares"] {
            Yaml::BadValue => {}
            Yaml::Array(shares) => {
                for share in shares {
                    let share = yaml_string(share).ok_or(ConfigError::InvalidValue("invalid-shares"))?;
                    config.invalid_shares.push(share.to_ascii_uppercase());
                }
            }
            _ => return Err(ConfigError::InvalidValue("invalid-shares")),
        }

        let fp = &node["fingerprint"];
        if !fp.is_badvalue() {
            if let Some(v) = yaml_bool(&fp["client"])? {
                config.fp_client = v;
            }
            if let Some(v) = yaml_bool(&fp["server"])? {
                config.fp_server = v;
            }
        }

        match &node["memcap"] {
            Yaml::BadValue => {}
            Yaml::Integer(v) if *v >= 0 => {
                config.memcap = *v as u64;
            }
            Yaml::String(s) => {
                config.memcap = get_memval(s).map_err(|reason| ConfigError::InvalidMemval {
                    value: s.to_string(),
                    reason,
                })?;
            }
            _ => return Err(ConfigError::InvalidValue("memcap")),
        }

        match &node["max-outstanding"] {
            Yaml::BadValue => {}
            Yaml::Integer(v) if *v > 0 && *v <= u16::MAX as i64 => {
                config.max_outstanding = *v as u16;
            }
            _ => return Err(ConfigError::InvalidValue("max-outstanding")),
        }

        match &node["disabled-events"] {
            Yaml::BadValue => {}
            Yaml::Array(events) => {
                for event in events {
                    let name = yaml_string(event).ok_or(ConfigError::InvalidValue("disabled-events"))?;
                    let event = SMBEvent::from_string(&name).ok_or(ConfigError::UnknownEvent(name))?;
                    config.disabled_events.push(event);
                }
            }
            _ => return Err(ConfigError::InvalidValue("disabled-events")),
        }

        Ok(config)
    }
}

fn yaml_string(node: &Yaml) -> Option<String> {
    match node {
        Yaml::String(s) => Some(s.to_string()),
        Yaml::Integer(i) => Some(i.to_string()),
        _ => None,
    }
}

/// Booleans as YAML values or as yes/no, true/false, on/off and 1/0 strings.
fn yaml_bool(node: &Yaml) -> Result<Option<bool>, ConfigError> {
    match node {
        Yaml::BadValue => Ok(None),
        Yaml::Boolean(b) => Ok(Some(*b)),
        Yaml::Integer(i) => Ok(Some(*i == 1)),
        Yaml::String(s) => match s.to_lowercase().as_str() {
            "1" | "yes" | "true" | "on" => Ok(Some(true)),
            "0" | "no" | "false" | "off" => Ok(Some(false)),
            _ => Err(ConfigError::InvalidValue("fingerprint")),
        },
        _ => Err(ConfigError::InvalidValue("fingerprint")),
    }
}

const BYTE: u64       = 1;
const KILOBYTE: u64   = 1024;
const MEGABYTE: u64   = 1_048_576;
const GIGABYTE: u64   = 1_073_741_824;

/// Helper function to retrieve memory unit from a string slice
///
/// Return value: u64
///
/// # Arguments
///
/// * `unit` - A string slice possibly containing memory unit
fn get_memunit(unit: &str) -> u64 {
    let unit = &unit.to_lowercase()[..];
    match unit {
        "b"     => { BYTE }
        "kb"    => { KILOBYTE }
        "mb"    => { MEGABYTE }
        "gb"    => { GIGABYTE }
        _       => { 0 }
    }
}

/// Parses memory units from human readable form to machine readable
///
/// Return value:
///     Result => Ok(u64)
///            => Err(error string)
///
/// # Arguments
///
/// * `arg` - A string slice that holds the value parsed from the config
pub fn get_memval(arg: &str) -> Result<u64, &'static str> {
    let arg = arg.trim();
    let val: f64;
    let mut unit: &str;
    let mut parser = tuple((preceded(multispace0, double),
                        preceded(multispace0, verify(not_line_ending, |c: &str| c.len() < 3))));
    let r: IResult<&str, (f64, &str)> = parser(arg);
    if let Ok(r) = r {
        val = (r.1).0;
        unit = (r.1).1;
    } else {
        return Err("Error parsing the memory value");
    }
    if unit.is_empty() {
        unit = "B";
    }
    let unit = get_memunit(unit);
    if unit == 0 {
        return Err("Invalid memory unit");
    }
    let res = val * unit as f64;
    Ok(res as u64)
}
