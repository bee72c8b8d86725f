use course_core::model::Email;

use super::SqliteRepository;
use super::mapping::{map_account_row, map_sqlx};
use crate::identity::{AccountDirectory, AccountRecord};
use crate::repository::StorageError;

#[async_trait::async_trait]
impl AccountDirectory for SqliteRepository {
    async fn insert_account(&self, account: AccountRecord) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO accounts (id, email, password_hash, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ",
        )
        .bind(account.principal.id().to_string())
        .bind(account.principal.email().as_str())
        .bind(account.password_hash)
        .bind(account.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn find_account(&self, email: &Email) -> Result<Option<AccountRecord>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, email, password_hash, created_at
            FROM accounts WHERE email = ?1
            ",
        )
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        row.as_ref().map(map_account_row).transpose()
    }
}
