use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};
use crate::time::hex_timestamp_to_datetime;

/// Decode rule for one variable name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Float,
    Integer,
    FloatArray,
    HexTimestamp,
    QuotedString,
    Raw,
}

/// Static per-name type table for the READVAR variable set.
///
/// Names absent from the table decode as raw strings; the variable set is
/// extensible and unknown names must not break parsing.
fn kind_for(name: &str) -> Kind {
    match name {
        "delay" | "dispersion" | "jitter" | "offset" | "rootdelay" | "rootdisp" | "xleave"
        | "authdelay" | "bcastdelay" | "clk_jitter" | "clk_wander" | "sys_jitter" => Kind::Float,
        "dstport" | "flash" | "headway" | "hmode" | "hpoll" | "keyid" | "leap" | "pmode"
        | "peermode" | "ppoll" | "precision" | "reach" | "srcport" | "stratum" | "unreach" => {
            Kind::Integer
        }
        "filtdelay" | "filtdisp" | "filtoffset" => Kind::FloatArray,
        "rec" | "reftime" => Kind::HexTimestamp,
        "srchost" => Kind::QuotedString,
        _ => Kind::Raw,
    }
}

/// A typed variable value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Floating-point seconds or milliseconds value
    Float(f64),
    /// Integer value
    Integer(i64),
    /// Space-separated float array, as in the `filtdelay` family
    Floats(Vec<f64>),
    /// Hex NTP timestamp parsed to an absolute time
    Time(DateTime<Utc>),
    /// String value, passed through verbatim or with surrounding quotes
    /// removed
    Str(String),
}

impl Value {
    /// The value as a float, if it is one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(value) => Some(*value),
            _ => None,
        }
    }

    /// The value as an integer, if it is one
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// The value as a float array, if it is one
    pub fn as_floats(&self) -> Option<&[f64]> {
        match self {
            Value::Floats(values) => Some(values),
            _ => None,
        }
    }

    /// The value as an absolute time, if it is one
    pub fn as_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Time(time) => Some(*time),
            _ => None,
        }
    }

    /// The value as a string, if it is one
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(value) => Some(value),
            _ => None,
        }
    }
}

/// NTP variables returned from a READVAR request
///
/// Entries keep the order in which the server listed them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Variables {
    entries: Vec<(String, Value)>,
}

impl Variables {
    /// Parses the text payload of a reassembled READVAR response
    pub fn parse(text: &str) -> Result<Variables> {
        let text = text
            .strip_suffix("\r\n")
            .or_else(|| text.strip_suffix('\n'))
            .unwrap_or(text);

        let mut entries = Vec::new();

        for pair in split_pairs(text) {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            let name = name.trim();
            entries.push((name.to_string(), parse_value(name, value)?));
        }

        Ok(Variables { entries })
    }

    /// Looks up a variable by name
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, value)| value)
    }

    /// Iterates over all variables in server order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }

    /// Number of variables in the record
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the record holds no variables
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clock offset relative to this peer
    pub fn offset(&self) -> Option<f64> {
        self.get("offset").and_then(Value::as_f64)
    }

    /// Round-trip delay to this peer
    pub fn delay(&self) -> Option<f64> {
        self.get("delay").and_then(Value::as_f64)
    }

    /// Jitter of this peer
    pub fn jitter(&self) -> Option<f64> {
        self.get("jitter").and_then(Value::as_f64)
    }

    /// Peer stratum
    pub fn stratum(&self) -> Option<i64> {
        self.get("stratum").and_then(Value::as_i64)
    }

    /// Leap indicator
    pub fn leap(&self) -> Option<i64> {
        self.get("leap").and_then(Value::as_i64)
    }

    /// Reachability register
    pub fn reach(&self) -> Option<i64> {
        self.get("reach").and_then(Value::as_i64)
    }

    /// Time the clock was last set or corrected
    pub fn reftime(&self) -> Option<DateTime<Utc>> {
        self.get("reftime").and_then(Value::as_time)
    }

    /// Delay samples of the clock filter
    pub fn filtdelay(&self) -> Option<&[f64]> {
        self.get("filtdelay").and_then(Value::as_floats)
    }

    /// Reference id of this peer
    pub fn refid(&self) -> Option<&str> {
        self.get("refid").and_then(Value::as_str)
    }

    /// Host name of this peer
    pub fn srchost(&self) -> Option<&str> {
        self.get("srchost").and_then(Value::as_str)
    }
}

/// Splits variable text on `,` followed by one or more whitespace characters.
///
/// This delimiter choice matters: array-valued fields contain commas only
/// inside their space-separated lists, never directly followed by whitespace
/// and another pair.
fn split_pairs(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut pairs = Vec::new();
    let mut start = 0;
    let mut index = 0;

    while index < bytes.len() {
        if bytes[index] == b',' {
            let mut next = index + 1;
            while next < bytes.len() && bytes[next].is_ascii_whitespace() {
                next += 1;
            }
            if next > index + 1 {
                pairs.push(&text[start..index]);
                start = next;
                index = next;
                continue;
            }
        }
        index += 1;
    }

    if start < text.len() {
        pairs.push(&text[start..]);
    }

    pairs
}

fn parse_value(name: &str, value: &str) -> Result<Value> {
    let parsed = match kind_for(name) {
        Kind::Float => Value::Float(parse_f64(name, value)?),
        Kind::Integer => {
            let integer = value
                .trim()
                .parse()
                .map_err(|_| Error::format(format!("{name}={value:?} is not an integer")))?;
            Value::Integer(integer)
        }
        Kind::FloatArray => {
            let floats = value
                .split_whitespace()
                .map(|field| parse_f64(name, field))
                .collect::<Result<Vec<f64>>>()?;
            Value::Floats(floats)
        }
        Kind::HexTimestamp => Value::Time(hex_timestamp_to_datetime(value.trim())?),
        Kind::QuotedString => Value::Str(value.trim().trim_matches('"').to_string()),
        Kind::Raw => Value::Str(value.to_string()),
    };

    Ok(parsed)
}

fn parse_f64(name: &str, value: &str) -> Result<f64> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::format(format!("{name}={value:?} is not a float")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let variables =
            Variables::parse("leap=0, stratum=2, offset=-0.342, filtdelay= 32.47 34.12").unwrap();

        assert_eq!(4, variables.len());
        assert_eq!(Some(0), variables.leap());
        assert_eq!(Some(2), variables.stratum());
        assert_eq!(Some(-0.342), variables.offset());
        assert_eq!(Some(&[32.47, 34.12][..]), variables.filtdelay());
    }

    #[test]
    fn test_parse_preserves_order() {
        let variables = Variables::parse("stratum=2, leap=0").unwrap();

        let names: Vec<&str> = variables.iter().map(|(name, _)| name).collect();
        assert_eq!(vec!["stratum", "leap"], names);
    }

    #[test]
    fn test_parse_newline_delimiter() {
        // Servers wrap long responses; the delimiter whitespace may be \r\n.
        let variables =
            Variables::parse("offset=1.5,\r\nfiltdisp= 0.00 1.94 3.96, delay=0.25\r\n").unwrap();

        assert_eq!(Some(1.5), variables.offset());
        assert_eq!(
            Some(&Value::Floats(vec![0.00, 1.94, 3.96])),
            variables.get("filtdisp")
        );
        assert_eq!(Some(0.25), variables.delay());
    }

    #[test]
    fn test_parse_hex_timestamps() {
        let variables = Variables::parse("reftime=0xe26c1358.3f31f4a9").unwrap();

        let reftime = variables.reftime().unwrap();
        assert_eq!(1_589_744_856, reftime.timestamp());
    }

    #[test]
    fn test_parse_quoted_string() {
        let variables = Variables::parse("srchost=\"ntp1.example.com\"").unwrap();

        assert_eq!(Some("ntp1.example.com"), variables.srchost());
    }

    #[test]
    fn test_parse_unknown_names_kept_verbatim() {
        let variables = Variables::parse("refid=GPS, frobnicate=xyzzy").unwrap();

        assert_eq!(Some("GPS"), variables.refid());
        assert_eq!(
            Some(&Value::Str("xyzzy".to_string())),
            variables.get("frobnicate")
        );
    }

    #[test]
    fn test_parse_rejects_bad_float() {
        let err = Variables::parse("offset=sideways").unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn test_parse_rejects_bad_integer() {
        let err = Variables::parse("stratum=lots").unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn test_parse_empty() {
        let variables = Variables::parse("").unwrap();
        assert!(variables.is_empty());
    }

    #[test]
    fn test_serialize() {
        let variables = Variables::parse("leap=0, offset=-0.342").unwrap();

        let json = serde_json::to_string(&variables).unwrap();
        assert!(json.contains("-0.342"));
    }
}
