use super::retry::with_retry;
use crate::config::RetrySettings;
use crate::domain::ports::{StorageRef, UserStore};
use crate::domain::user::{NewUser, PasswordHash, PersonalNumber, User};
use crate::error::{Result, ShopError};
use chrono::{Local, NaiveDate};

/// Registration and login.
pub struct AccountService {
    storage: StorageRef,
    retry: RetrySettings,
    minimum_age: u32,
}

impl AccountService {
    pub fn new(storage: StorageRef, retry: RetrySettings, minimum_age: u32) -> Self {
        Self {
            storage,
            retry,
            minimum_age,
        }
    }

    /// Registers a customer who is old enough on today's date.
    pub async fn register(
        &self,
        username: &str,
        password: &str,
        personal_number: &str,
    ) -> Result<User> {
        self.register_on(username, password, personal_number, Local::now().date_naive())
            .await
    }

    pub async fn register_on(
        &self,
        username: &str,
        password: &str,
        personal_number: &str,
        today: NaiveDate,
    ) -> Result<User> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(ShopError::InvalidInput(
                "Username and password must not be empty".to_string(),
            ));
        }
        let personal_number = PersonalNumber::parse(personal_number)?;
        if personal_number.age_on(today) < self.minimum_age {
            return Err(ShopError::Underage {
                minimum_age: self.minimum_age,
            });
        }

        let new_user = NewUser {
            username: username.to_string(),
            password_hash: PasswordHash::create(password),
            personal_number: Some(personal_number),
        };

        let user = with_retry(&self.retry, || self.insert(new_user.clone())).await?;
        tracing::info!(user_id = user.id, username = %user.username, "user registered");
        Ok(user)
    }

    async fn insert(&self, new_user: NewUser) -> Result<User> {
        let mut tx = self.storage.begin().await?;
        let user = tx.insert_user(new_user).await?;
        tx.commit().await?;
        Ok(user)
    }

    /// Checks credentials. Unknown users and wrong passwords are
    /// indistinguishable to the caller.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<User> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(ShopError::InvalidInput(
                "Username and password must not be empty".to_string(),
            ));
        }

        let found = with_retry(&self.retry, || self.find(username)).await?;
        match found {
            Some(user) if user.password_hash.verify(password) => {
                tracing::info!(user_id = user.id, "user authenticated");
                Ok(user)
            }
            Some(_) | None => {
                tracing::warn!(username, "authentication failed");
                Err(ShopError::AuthFailure)
            }
        }
    }

    async fn find(&self, username: &str) -> Result<Option<User>> {
        self.storage.begin().await?.get_user_by_name(username).await
    }
}
