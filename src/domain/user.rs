use super::cart::UserId;
use crate::error::{Result, ShopError};
use chrono::{Datelike, NaiveDate};
use pbkdf2::pbkdf2_hmac;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

/// A Swedish-style personal identity number, `YYYYMMDDXXXX`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PersonalNumber {
    raw: String,
    birth_date: NaiveDate,
}

impl PersonalNumber {
    pub fn parse(input: &str) -> Result<Self> {
        let raw = input.trim();
        if raw.len() != 12 || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ShopError::InvalidInput(
                "Personal number must be 12 digits (YYYYMMDDXXXX)".to_string(),
            ));
        }
        let birth_date = NaiveDate::parse_from_str(&raw[..8], "%Y%m%d").map_err(|_| {
            ShopError::InvalidInput(format!("'{}' is not a valid birth date", &raw[..8]))
        })?;
        Ok(Self {
            raw: raw.to_string(),
            birth_date,
        })
    }

    /// Whole years lived on `today`.
    pub fn age_on(&self, today: NaiveDate) -> u32 {
        let mut age = today.year() - self.birth_date.year();
        if today < self.birthday_in(today.year()) {
            age -= 1;
        }
        u32::try_from(age).unwrap_or(0)
    }

    /// Feb 29 birthdays fall on Feb 28 in common years.
    fn birthday_in(&self, year: i32) -> NaiveDate {
        self.birth_date
            .with_year(year)
            .or_else(|| NaiveDate::from_ymd_opt(year, 2, 28))
            .unwrap_or(self.birth_date)
    }
}

impl TryFrom<String> for PersonalNumber {
    type Error = ShopError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<PersonalNumber> for String {
    fn from(value: PersonalNumber) -> Self {
        value.raw
    }
}

/// PBKDF2-HMAC-SHA256 digest, stored as `rounds$salt$digest` with hex salt
/// and digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PasswordHash(String);

const PBKDF2_ROUNDS: u32 = 100_000;

impl PasswordHash {
    pub fn create(password: &str) -> Self {
        let salt: [u8; 16] = rand::random();
        Self::derive(password, &salt, PBKDF2_ROUNDS)
    }

    fn derive(password: &str, salt: &[u8], rounds: u32) -> Self {
        Self(format!(
            "{rounds}${}${}",
            hex::encode(salt),
            hex::encode(digest(password, salt, rounds))
        ))
    }

    pub fn verify(&self, password: &str) -> bool {
        let mut parts = self.0.splitn(3, '$');
        let (Some(rounds), Some(salt_hex), Some(digest_hex)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return false;
        };
        let (Ok(rounds), Ok(salt), Ok(expected)) = (
            rounds.parse::<u32>(),
            hex::decode(salt_hex),
            hex::decode(digest_hex),
        ) else {
            return false;
        };
        if rounds == 0 {
            return false;
        }
        let actual = digest(password, &salt, rounds);
        actual.as_slice().ct_eq(expected.as_slice()).into()
    }
}

fn digest(password: &str, salt: &[u8], rounds: u32) -> [u8; 32] {
    let mut out = [0u8; 32];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, rounds, &mut out);
    out
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "user_id")]
    pub id: UserId,
    pub username: String,
    pub password_hash: PasswordHash,
    pub personal_number: Option<PersonalNumber>,
}

/// A registration that has passed validation but has no id yet.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: PasswordHash,
    pub personal_number: Option<PersonalNumber>,
}

impl NewUser {
    pub fn with_id(self, id: UserId) -> User {
        User {
            id,
            username: self.username,
            password_hash: self.password_hash,
            personal_number: self.personal_number,
        }
    }
}
