//! Property types and the value conversions between the store and legacy files.
//!
//! The store keeps every value as a string tagged with a [`PropType`]. Legacy
//! files use their own spellings for some of them (yes/no booleans, dotted
//! netmasks in `sortlist`, integer bitmasks in `nscd.conf`), so each direction
//! has a conversion here.

use std::net::{IpAddr, Ipv4Addr};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

/// Value type of a stored property.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PropType {
    Astring,
    Boolean,
    Integer,
    Host,
    Hostname,
    NetAddress,
}

/// Check a store-side value against its type.
pub fn check_type(ty: PropType, value: &str) -> bool {
    match ty {
        PropType::Astring => true,
        PropType::Boolean => value == "true" || value == "false",
        PropType::Integer => value.parse::<i64>().is_ok(),
        PropType::Host => is_host(value),
        PropType::Hostname => is_hostname(value),
        PropType::NetAddress => is_net_address(value),
    }
}

/// RFC 1123 host name, optionally fully qualified with a trailing dot.
pub fn is_hostname(value: &str) -> bool {
    let name = value.strip_suffix('.').unwrap_or(value);
    if name.is_empty() || name.len() > 255 {
        return false;
    }
    name.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

/// A host name or address literal, with an optional `:port` suffix.
/// IPv6 literals carrying a port must be bracketed (`[::1]:389`).
pub fn is_host(value: &str) -> bool {
    if value.parse::<IpAddr>().is_ok() {
        return true;
    }
    if let Some(rest) = value.strip_prefix('[') {
        return match rest.split_once(']') {
            Some((addr, tail)) => {
                addr.parse::<IpAddr>().is_ok()
                    && (tail.is_empty() || tail.strip_prefix(':').is_some_and(is_port))
            }
            None => false,
        };
    }
    let host = match value.rsplit_once(':') {
        Some((host, port)) if is_port(port) => host,
        Some(_) => return false,
        None => value,
    };
    host.parse::<Ipv4Addr>().is_ok() || is_hostname(host)
}

fn is_port(port: &str) -> bool {
    port.parse::<u16>().is_ok()
}

/// An IPv4 or IPv6 address with an optional `/prefix`.
pub fn is_net_address(value: &str) -> bool {
    let (addr, prefix) = match value.split_once('/') {
        Some((addr, prefix)) => (addr, Some(prefix)),
        None => (value, None),
    };
    let Ok(addr) = addr.parse::<IpAddr>() else {
        return false;
    };
    match prefix {
        None => true,
        Some(p) => {
            let max = if addr.is_ipv4() { 32 } else { 128 };
            p.parse::<u8>().is_ok_and(|p| p <= max)
        }
    }
}

/// A `securenets` entry: `netmask address`, both IPv4.
pub fn is_securenet(value: &str) -> bool {
    let mut parts = value.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(mask), Some(addr), None) => {
            mask.parse::<Ipv4Addr>().is_ok() && addr.parse::<Ipv4Addr>().is_ok()
        }
        _ => false,
    }
}

/// How a legacy file spells a boolean.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolStyle {
    /// `yes` / `no`
    YesNo,
    /// `TRUE` / `FALSE`
    TrueFalse,
}

/// Convert a legacy boolean into the store spelling.
pub fn bool_from_legacy(value: &str) -> Option<&'static str> {
    match value.to_ascii_lowercase().as_str() {
        "yes" | "true" | "on" => Some("true"),
        "no" | "false" | "off" => Some("false"),
        _ => None,
    }
}

/// Convert a store boolean into the legacy spelling.
pub fn bool_to_legacy(value: &str, style: BoolStyle) -> Option<&'static str> {
    let truth = match value {
        "true" => true,
        "false" => false,
        _ => return None,
    };
    Some(match (style, truth) {
        (BoolStyle::YesNo, true) => "yes",
        (BoolStyle::YesNo, false) => "no",
        (BoolStyle::TrueFalse, true) => "TRUE",
        (BoolStyle::TrueFalse, false) => "FALSE",
    })
}

/// Dotted-decimal netmasks indexed by prefix length.
pub const NETMASKS: [&str; 33] = [
    "0.0.0.0",
    "128.0.0.0",
    "192.0.0.0",
    "224.0.0.0",
    "240.0.0.0",
    "248.0.0.0",
    "252.0.0.0",
    "254.0.0.0",
    "255.0.0.0",
    "255.128.0.0",
    "255.192.0.0",
    "255.224.0.0",
    "255.240.0.0",
    "255.248.0.0",
    "255.252.0.0",
    "255.254.0.0",
    "255.255.0.0",
    "255.255.128.0",
    "255.255.192.0",
    "255.255.224.0",
    "255.255.240.0",
    "255.255.248.0",
    "255.255.252.0",
    "255.255.254.0",
    "255.255.255.0",
    "255.255.255.128",
    "255.255.255.192",
    "255.255.255.224",
    "255.255.255.240",
    "255.255.255.248",
    "255.255.255.252",
    "255.255.255.254",
    "255.255.255.255",
];

/// Netmask for a prefix length; `None` outside `0..=32`.
pub fn prefix_to_netmask(prefix: i64) -> Option<&'static str> {
    usize::try_from(prefix).ok().and_then(|i| NETMASKS.get(i).copied())
}

/// Prefix length for a contiguous dotted-decimal netmask.
pub fn netmask_to_prefix(mask: &str) -> Option<u8> {
    NETMASKS
        .iter()
        .position(|m| *m == mask)
        .and_then(|i| u8::try_from(i).ok())
}

/// Store form (`10.0.0.0/8`) to sortlist form (`10.0.0.0/255.0.0.0`).
/// Entries without a prefix pass through unchanged.
pub fn na_to_sl(net_address: &str) -> Option<String> {
    match net_address.split_once('/') {
        Some((addr, prefix)) => {
            addr.parse::<Ipv4Addr>().ok()?;
            let mask = prefix_to_netmask(prefix.parse().ok()?)?;
            Some(format!("{addr}/{mask}"))
        }
        None => net_address
            .parse::<Ipv4Addr>()
            .ok()
            .map(|_| net_address.to_string()),
    }
}

/// Sortlist form (`10.0.0.0/255.0.0.0`) to store form (`10.0.0.0/8`).
pub fn sl_to_na(sortlist: &str) -> Option<String> {
    match sortlist.split_once('/') {
        Some((addr, mask)) => {
            addr.parse::<Ipv4Addr>().ok()?;
            let prefix = netmask_to_prefix(mask)?;
            Some(format!("{addr}/{prefix}"))
        }
        None => sortlist
            .parse::<Ipv4Addr>()
            .ok()
            .map(|_| sortlist.to_string()),
    }
}

/// Converts between an integer bitmask and a list of flag names.
///
/// The mask with every named bit set is spelled `all` in the list form, and
/// `all` in a list expands to that mask regardless of the other names.
#[derive(Debug)]
pub struct FlagCodec {
    flags: &'static [(&'static str, u32)],
    all: u32,
}

pub const ALL_FLAGS: &str = "all";

impl FlagCodec {
    pub const fn new(flags: &'static [(&'static str, u32)], all: u32) -> Self {
        Self { flags, all }
    }

    /// Parse a legacy mask written in decimal or `0x` hex.
    pub fn parse_mask(value: &str) -> Option<u32> {
        match value
            .strip_prefix("0x")
            .or_else(|| value.strip_prefix("0X"))
        {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => value.parse().ok(),
        }
    }

    /// Mask to names. `None` if the mask carries bits without a name.
    pub fn to_names(&self, mask: u32) -> Option<Vec<String>> {
        if mask & !self.all != 0 {
            return None;
        }
        if mask == self.all {
            return Some(vec![ALL_FLAGS.to_string()]);
        }
        Some(
            self.flags
                .iter()
                .filter(|(_, bit)| mask & bit != 0)
                .map(|(name, _)| name.to_string())
                .collect(),
        )
    }

    /// Names to mask. `None` if a name is unknown.
    pub fn to_mask(&self, names: &[String]) -> Option<u32> {
        if names.iter().any(|n| n == ALL_FLAGS) {
            return Some(self.all);
        }
        names.iter().try_fold(0, |mask, name| {
            self.flags
                .iter()
                .find(|(flag, _)| flag == name)
                .map(|(_, bit)| mask | bit)
        })
    }

    pub fn is_known(&self, name: &str) -> bool {
        name == ALL_FLAGS || self.flags.iter().any(|(flag, _)| *flag == name)
    }
}

/// nscd `debug-level` bits.
pub static DEBUG_LEVELS: FlagCodec = FlagCodec::new(
    &[
        ("critical", 0x0001),
        ("error", 0x0002),
        ("warning", 0x0004),
        ("info", 0x0008),
        ("debug", 0x0010),
        ("debug_6", 0x0020),
    ],
    0x003f,
);

/// nscd `debug-components` bits.
pub static DEBUG_COMPONENTS: FlagCodec = FlagCodec::new(
    &[
        ("access_info", 0x0001),
        ("int_addr", 0x0002),
        ("nsw_state", 0x0004),
        ("getent_ctx", 0x0008),
        ("switch_engine", 0x0010),
        ("self_cred", 0x0020),
        ("admin", 0x0040),
        ("config", 0x0080),
        ("smf_monitor", 0x0100),
        ("cache", 0x0200),
        ("frontend", 0x0400),
    ],
    0x07ff,
);
