// SPDX-License-Identifier: Apache-2.0

//! Character set correspondence between the two engines
//!
//! The connection is opened with a client charset matching the local
//! encoding, so the remote transliterates every column whose charset has a
//! local counterpart. Columns without one arrive untagged and are handled
//! according to [`CharsetPolicy`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{FdwError, FdwResult};

/// Remote charset name -> local encoding name, for 1:1 correspondences.
const CHARSET_MAP: &[(&str, &str)] = &[
    ("UTF8", "UTF8"),
    ("UNICODE_FSS", "UTF8"),
    ("ASCII", "SQL_ASCII"),
    ("ISO8859_1", "LATIN1"),
    ("ISO8859_2", "LATIN2"),
    ("ISO8859_3", "LATIN3"),
    ("ISO8859_4", "LATIN4"),
    ("ISO8859_5", "ISO_8859_5"),
    ("ISO8859_6", "ISO_8859_6"),
    ("ISO8859_7", "ISO_8859_7"),
    ("ISO8859_8", "ISO_8859_8"),
    ("ISO8859_9", "LATIN5"),
    ("ISO8859_13", "LATIN7"),
    ("WIN1250", "WIN1250"),
    ("WIN1251", "WIN1251"),
    ("WIN1252", "WIN1252"),
    ("WIN1253", "WIN1253"),
    ("WIN1254", "WIN1254"),
    ("WIN1255", "WIN1255"),
    ("WIN1256", "WIN1256"),
    ("WIN1257", "WIN1257"),
    ("WIN1258", "WIN1258"),
    ("DOS866", "WIN866"),
    ("KOI8R", "KOI8R"),
    ("KOI8U", "KOI8U"),
    ("BIG_5", "BIG5"),
    ("GB_2312", "EUC_CN"),
    ("GBK", "GBK"),
    ("GB18030", "GB18030"),
    ("KSC_5601", "UHC"),
    ("EUCJ_0208", "EUC_JP"),
    ("SJIS_0208", "SJIS"),
    ("TIS620", "WIN874"),
];

/// Local encoding name -> client charset sent on connect, where the names differ.
const CLIENT_CHARSET_OVERRIDES: &[(&str, &str)] = &[
    ("SQL_ASCII", "NONE"),
    ("LATIN1", "ISO8859_1"),
    ("LATIN2", "ISO8859_2"),
    ("ISO_8859_5", "ISO8859_5"),
    ("ISO_8859_6", "ISO8859_6"),
    ("ISO_8859_7", "ISO8859_7"),
    ("ISO_8859_8", "ISO8859_8"),
    ("WIN866", "DOS866"),
    ("EUC_JP", "EUCJ_0208"),
    ("EUC_CN", "GB_2312"),
    ("BIG5", "BIG_5"),
    ("SJIS", "SJIS_0208"),
];

/// Local encoding for a remote charset, `None` when no 1:1 mapping exists.
pub fn local_encoding_for(remote_charset: &str) -> Option<&'static str> {
    let upper = remote_charset.trim().to_ascii_uppercase();
    CHARSET_MAP
        .iter()
        .find(|(remote, _)| *remote == upper)
        .map(|(_, local)| *local)
}

/// Charset to request on connect for a given local encoding.
pub fn client_charset_for(local_encoding: &str) -> String {
    let upper = local_encoding.trim().to_ascii_uppercase();
    CLIENT_CHARSET_OVERRIDES
        .iter()
        .find(|(local, _)| *local == upper)
        .map(|(_, remote)| (*remote).to_string())
        .unwrap_or(upper)
}

/// True for charsets whose data is binary rather than character.
pub fn is_binary_charset(remote_charset: &str) -> bool {
    remote_charset.trim().eq_ignore_ascii_case("OCTETS")
}

/// What to do with character data that has no local encoding
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CharsetPolicy {
    /// Reject the value with a conversion error.
    #[default]
    Error,
    /// Hand the bytes to the host uninterpreted.
    Passthrough,
}

impl CharsetPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CharsetPolicy::Error => "error",
            CharsetPolicy::Passthrough => "passthrough",
        }
    }

    /// Applies the policy to untagged character bytes read from `column`.
    pub fn accept_untagged(&self, column: &str, bytes: &[u8]) -> FdwResult<Vec<u8>> {
        match self {
            CharsetPolicy::Passthrough => Ok(bytes.to_vec()),
            CharsetPolicy::Error => Err(FdwError::conversion(format!(
                "column \"{column}\" holds character data with no local encoding; \
                 set unmapped_charset 'passthrough' on the server to read it as raw bytes"
            ))),
        }
    }
}

impl FromStr for CharsetPolicy {
    type Err = FdwError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(CharsetPolicy::Error),
            "passthrough" => Ok(CharsetPolicy::Passthrough),
            other => Err(FdwError::config_with_hint(
                format!("invalid value for option \"unmapped_charset\": \"{other}\""),
                "valid values are: error, passthrough",
            )),
        }
    }
}

impl fmt::Display for CharsetPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapped_charsets() {
        assert_eq!(local_encoding_for("utf8"), Some("UTF8"));
        assert_eq!(local_encoding_for("WIN1252"), Some("WIN1252"));
        assert_eq!(local_encoding_for("DOS866"), Some("WIN866"));
        assert_eq!(local_encoding_for("NONE"), None);
        assert_eq!(local_encoding_for("DOS437"), None);
    }

    #[test]
    fn test_client_charset() {
        assert_eq!(client_charset_for("UTF8"), "UTF8");
        assert_eq!(client_charset_for("sql_ascii"), "NONE");
        assert_eq!(client_charset_for("WIN866"), "DOS866");
        assert_eq!(client_charset_for("EUC_JP"), "EUCJ_0208");
    }

    #[test]
    fn test_policy() {
        assert_eq!(CharsetPolicy::default(), CharsetPolicy::Error);
        assert!(CharsetPolicy::Error.accept_untagged("NAME", b"\xff").is_err());
        assert_eq!(
            CharsetPolicy::Passthrough.accept_untagged("NAME", b"\xff").unwrap(),
            vec![0xff]
        );
        assert_eq!("PassThrough".parse::<CharsetPolicy>().unwrap(), CharsetPolicy::Passthrough);
        assert!("lossy".parse::<CharsetPolicy>().is_err());
    }
}
