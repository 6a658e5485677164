use std::fmt::Display;

use bstr::{BString, ByteSlice, ByteVec};
use once_cell::sync::Lazy;
use regex::bytes::Regex;

use crate::error::{Error, Result};

static STAMP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.*?)\s*<([^>]*)>\s+(\d+)\s+([+-])(\d{2})(\d{2})$").expect("valid stamp regex")
});

/// `name <email> time ±hhmm` as found on author and committer lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitStamp {
    pub name: BString,
    pub email: BString,
    /// Seconds since the epoch.
    pub time: i64,
    /// Timezone offset in seconds, sign preserved.
    pub offset: i32,
}

impl CommitStamp {
    pub fn new(name: impl Into<BString>, email: impl Into<BString>, time: i64, offset: i32) -> Self {
        CommitStamp {
            name: name.into(),
            email: email.into(),
            time,
            offset,
        }
    }

    pub fn parse(line: &[u8]) -> Result<CommitStamp> {
        let captures = STAMP.captures(line).ok_or_else(|| {
            Error::malformed(format!("invalid commit stamp: {:?}", line.as_bstr()))
        })?;

        let number = |i: usize| -> Result<i64> {
            let digits = captures[i].to_str().map_err(|_| Error::malformed("non-ascii digits"))?;
            digits
                .parse::<i64>()
                .map_err(|e| Error::malformed(format!("invalid number {digits:?} in stamp: {e}")))
        };

        let time = number(3)?;
        let hours = number(5)?;
        let minutes = number(6)?;
        let sign = if &captures[4] == b"-" { -1 } else { 1 };

        Ok(CommitStamp {
            name: BString::from(&captures[1]),
            email: BString::from(&captures[2]),
            time,
            offset: (sign * (hours * 3600 + minutes * 60)) as i32,
        })
    }

    /// Fails for offsets that are not whole minutes, they cannot be represented.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        if self.offset % 60 != 0 {
            return Err(Error::InvalidState(format!(
                "cannot serialize sub-minute timezone offset {}",
                self.offset
            )));
        }

        let sign = if self.offset < 0 { '-' } else { '+' };
        let minutes = self.offset.unsigned_abs() / 60;

        let mut out = Vec::with_capacity(self.name.len() + self.email.len() + 24);
        out.push_str(&self.name);
        out.push_str(b" <");
        out.push_str(&self.email);
        out.push_str(format!("> {} {}{:02}{:02}", self.time, sign, minutes / 60, minutes % 60));
        Ok(out)
    }
}

impl Display for CommitStamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_positive_offset() {
        let stamp = CommitStamp::parse(b"J Doe <j@x> 1700000000 +0200").unwrap();
        assert_eq!(stamp.name, "J Doe");
        assert_eq!(stamp.email, "j@x");
        assert_eq!(stamp.time, 1700000000);
        assert_eq!(stamp.offset, 7200);
    }

    #[test]
    fn parse_negative_half_hour_offset() {
        let stamp = CommitStamp::parse(b"A  B   <a@b.c>  42  -0130").unwrap();
        assert_eq!(stamp.name, "A  B");
        assert_eq!(stamp.offset, -5400);
        assert_eq!(stamp.serialize().unwrap(), b"A  B <a@b.c> 42 -0130");
    }

    #[test]
    fn serialize_round_trip() {
        let line = b"Jane Roe <jane@example.org> 1234567890 +0545";
        let stamp = CommitStamp::parse(line).unwrap();
        assert_eq!(stamp.offset, 5 * 3600 + 45 * 60);
        assert_eq!(stamp.serialize().unwrap(), line);
    }

    #[test]
    fn sub_minute_offset_fails() {
        let stamp = CommitStamp::new("x", "y", 0, 61);
        assert!(matches!(stamp.serialize(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn garbage_fails() {
        assert!(matches!(
            CommitStamp::parse(b"nobody 12 +0000"),
            Err(Error::MalformedFormat(_))
        ));
    }
}
