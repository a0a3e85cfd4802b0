//! Transaction management utilities for repositories.

use crate::{db::connection::DbPool, error::AppError};
use sqlx::{Sqlite, Transaction};

pub type DbTransaction<'c> = Transaction<'c, Sqlite>;

/// Begin a new database transaction.
///
/// On success, the transaction can be committed via [`commit_transaction`].
/// Dropping it without committing rolls it back.
pub async fn begin_transaction(db: &DbPool) -> Result<DbTransaction<'_>, AppError> {
    db.begin()
        .await
        .map_err(|e| AppError::InternalServerError(e.into()))
}

/// Commit a transaction.
pub async fn commit_transaction(tx: DbTransaction<'_>) -> Result<(), AppError> {
    tx.commit()
        .await
        .map_err(|e| AppError::InternalServerError(e.into()))
}
