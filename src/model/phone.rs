use std::{fmt, ops::Deref, str::FromStr};

use phonenumber::Mode;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A Mobile-ID subscriber's phone number, always written in E.164 form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PhoneNumber {
    inner: phonenumber::PhoneNumber,
}

impl Deref for PhoneNumber {
    type Target = phonenumber::PhoneNumber;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl PhoneNumber {
    /// E.164, e.g. `+37251234567`, as the Mobile-ID API expects it.
    pub fn e164(&self) -> String {
        self.inner.format().mode(Mode::E164).to_string()
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.e164())
    }
}

impl FromStr for PhoneNumber {
    type Err = Error;

    /// Numbers must carry their international prefix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        phonenumber::parse(None, s.trim())
            .map(|inner| PhoneNumber { inner })
            .map_err(|err| Error::InvalidInput(format!("invalid phone number: {err}")))
    }
}

impl TryFrom<String> for PhoneNumber {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<PhoneNumber> for String {
    fn from(number: PhoneNumber) -> Self {
        number.e164()
    }
}
