// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ASN.1 time primitives (UTCTime and GeneralizedTime).

use {
    bcder::{
        decode::{Constructed, DecodeError, Primitive, Source},
        encode::PrimitiveContent,
        Mode, Tag,
    },
    chrono::{Datelike, TimeZone, Timelike},
    std::{io::Write, ops::Deref, str::FromStr},
};

fn parse_digits<S: Source>(
    prim: &Primitive<S>,
    data: &[u8],
) -> Result<u32, DecodeError<S::Error>> {
    let s = std::str::from_utf8(data).map_err(|_| prim.content_err("non-ASCII time value"))?;

    u32::from_str(s).map_err(|_| prim.content_err("non-numeric time value"))
}

/// A `Time` as used by certificate validity and signing-time attributes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Time {
    UtcTime(UtcTime),
    GeneralTime(GeneralizedTime),
}

impl Time {
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_primitive(|tag, prim| match tag {
            Tag::UTC_TIME => Ok(Self::UtcTime(UtcTime::from_primitive(prim)?)),
            Tag::GENERALIZED_TIME => Ok(Self::GeneralTime(GeneralizedTime::from_primitive(
                prim,
                GeneralizedTimeAllowFractionalSeconds::No,
            )?)),
            _ => Err(prim.content_err("unexpected tag for Time")),
        })
    }

    pub fn take_opt_from<S: Source>(
        cons: &mut Constructed<S>,
    ) -> Result<Option<Self>, DecodeError<S::Error>> {
        cons.take_opt_primitive(|tag, prim| match tag {
            Tag::UTC_TIME => Ok(Self::UtcTime(UtcTime::from_primitive(prim)?)),
            Tag::GENERALIZED_TIME => Ok(Self::GeneralTime(GeneralizedTime::from_primitive(
                prim,
                GeneralizedTimeAllowFractionalSeconds::No,
            )?)),
            _ => Err(prim.content_err("unexpected tag for Time")),
        })
    }

    pub fn encode_ref(&self) -> impl bcder::encode::Values + '_ {
        match self {
            Self::UtcTime(utc) => (Some(utc.encode_ref()), None),
            Self::GeneralTime(gt) => (None, Some(gt.encode_ref())),
        }
    }
}

impl AsRef<chrono::DateTime<chrono::Utc>> for Time {
    fn as_ref(&self) -> &chrono::DateTime<chrono::Utc> {
        match self {
            Self::UtcTime(dt) => dt.deref(),
            Self::GeneralTime(dt) => dt.deref(),
        }
    }
}

impl From<chrono::DateTime<chrono::Utc>> for Time {
    fn from(t: chrono::DateTime<chrono::Utc>) -> Self {
        Self::UtcTime(UtcTime(t))
    }
}

/// Whether fractional seconds are tolerated when parsing GeneralizedTime.
///
/// The DER profile forbids them but several timestamp authorities emit
/// them in TSTInfo genTime anyway.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GeneralizedTimeAllowFractionalSeconds {
    No,
    Yes,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GeneralizedTime(chrono::DateTime<chrono::Utc>);

impl Deref for GeneralizedTime {
    type Target = chrono::DateTime<chrono::Utc>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl GeneralizedTime {
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_primitive_if(Tag::GENERALIZED_TIME, |prim| {
            Self::from_primitive(prim, GeneralizedTimeAllowFractionalSeconds::No)
        })
    }

    pub fn take_from_allow_fractional_z<S: Source>(
        cons: &mut Constructed<S>,
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_primitive_if(Tag::GENERALIZED_TIME, |prim| {
            Self::from_primitive(prim, GeneralizedTimeAllowFractionalSeconds::Yes)
        })
    }

    pub fn from_primitive<S: Source>(
        prim: &mut Primitive<S>,
        fractional: GeneralizedTimeAllowFractionalSeconds,
    ) -> Result<Self, DecodeError<S::Error>> {
        let data = prim.take_all()?;

        // YYYYMMDDHHMMSS[.f+]Z
        if data.len() < 15 || data[data.len() - 1] != b'Z' {
            return Err(prim.content_err("malformed GeneralizedTime"));
        }

        let year = parse_digits(prim, &data[0..4])? as i32;
        let month = parse_digits(prim, &data[4..6])?;
        let day = parse_digits(prim, &data[6..8])?;
        let hour = parse_digits(prim, &data[8..10])?;
        let minute = parse_digits(prim, &data[10..12])?;
        let second = parse_digits(prim, &data[12..14])?;

        let nanos = match &data[14..data.len() - 1] {
            [] => 0,
            [b'.', digits @ ..] => {
                if matches!(fractional, GeneralizedTimeAllowFractionalSeconds::No) {
                    return Err(prim.content_err("fractional seconds not allowed here"));
                } else if digits.is_empty() || digits.len() > 9 {
                    return Err(prim.content_err("malformed fractional seconds"));
                }

                let f = parse_digits(prim, digits)?;
                f * 10u32.pow(9 - digits.len() as u32)
            }
            _ => return Err(prim.content_err("malformed GeneralizedTime")),
        };

        match chrono::Utc.with_ymd_and_hms(year, month, day, hour, minute, second) {
            chrono::LocalResult::Single(dt) => match dt.with_nanosecond(nanos) {
                Some(dt) => Ok(Self(dt)),
                None => Err(prim.content_err("time value out of range")),
            },
            _ => Err(prim.content_err("time value out of range")),
        }
    }
}

impl std::fmt::Display for GeneralizedTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04}{:02}{:02}{:02}{:02}{:02}Z",
            self.0.year(),
            self.0.month(),
            self.0.day(),
            self.0.hour(),
            self.0.minute(),
            self.0.second()
        )
    }
}

impl From<chrono::DateTime<chrono::Utc>> for GeneralizedTime {
    fn from(t: chrono::DateTime<chrono::Utc>) -> Self {
        Self(t)
    }
}

impl PrimitiveContent for GeneralizedTime {
    const TAG: Tag = Tag::GENERALIZED_TIME;

    fn encoded_len(&self, _: Mode) -> usize {
        self.to_string().len()
    }

    fn write_encoded<W: Write>(&self, _: Mode, target: &mut W) -> Result<(), std::io::Error> {
        target.write_all(self.to_string().as_bytes())
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UtcTime(chrono::DateTime<chrono::Utc>);

impl UtcTime {
    /// Obtain an instance for the current time.
    pub fn now() -> Self {
        Self(chrono::Utc::now())
    }

    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_primitive_if(Tag::UTC_TIME, |prim| Self::from_primitive(prim))
    }

    pub fn from_primitive<S: Source>(
        prim: &mut Primitive<S>,
    ) -> Result<Self, DecodeError<S::Error>> {
        let data = prim.take_all()?;

        // YYMMDDHHMMSSZ
        if data.len() != 13 || data[12] != b'Z' {
            return Err(prim.content_err("malformed UTCTime"));
        }

        let year = parse_digits(prim, &data[0..2])? as i32;
        let year = if year >= 50 { year + 1900 } else { year + 2000 };

        let month = parse_digits(prim, &data[2..4])?;
        let day = parse_digits(prim, &data[4..6])?;
        let hour = parse_digits(prim, &data[6..8])?;
        let minute = parse_digits(prim, &data[8..10])?;
        let second = parse_digits(prim, &data[10..12])?;

        match chrono::Utc.with_ymd_and_hms(year, month, day, hour, minute, second) {
            chrono::LocalResult::Single(dt) => Ok(Self(dt)),
            _ => Err(prim.content_err("time value out of range")),
        }
    }
}

impl std::fmt::Display for UtcTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:02}{:02}{:02}{:02}{:02}{:02}Z",
            self.0.year() % 100,
            self.0.month(),
            self.0.day(),
            self.0.hour(),
            self.0.minute(),
            self.0.second()
        )
    }
}

impl From<chrono::DateTime<chrono::Utc>> for UtcTime {
    fn from(t: chrono::DateTime<chrono::Utc>) -> Self {
        Self(t)
    }
}

impl Deref for UtcTime {
    type Target = chrono::DateTime<chrono::Utc>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl PrimitiveContent for UtcTime {
    const TAG: Tag = Tag::UTC_TIME;

    fn encoded_len(&self, _: Mode) -> usize {
        self.to_string().len()
    }

    fn write_encoded<W: Write>(&self, _: Mode, target: &mut W) -> Result<(), std::io::Error> {
        target.write_all(self.to_string().as_bytes())
    }
}
