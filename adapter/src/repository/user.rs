use crate::database::{model::user::UserRow, ConnectionPool};
use async_trait::async_trait;
use derive_new::new;
use kernel::model::id::UserId;
use kernel::model::user::{event::CreateUser, User};
use kernel::repository::user::UserRepository;
use shared::error::{AppError, AppResult};

#[derive(new)]
pub struct UserRepositoryImpl {
    db: ConnectionPool,
}

#[async_trait]
impl UserRepository for UserRepositoryImpl {
    async fn create(&self, event: CreateUser) -> AppResult<UserId> {
        let registered = sqlx::query_scalar::<_, UserId>(
            r#"
            SELECT user_id
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(&event.email)
        .fetch_optional(self.db.inner_ref())
        .await
        .map_err(AppError::SpecificOperationError)?;

        if registered.is_some() {
            return Err(AppError::ResourceConflict(format!(
                "メールアドレス（{}）は登録済みです。",
                event.email
            )));
        }

        let user_id = UserId::new();
        let res = sqlx::query(
            r#"
            INSERT INTO users (user_id, user_name, email, role)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(user_id)
        .bind(event.user_name)
        .bind(event.email)
        .bind(event.role)
        .execute(self.db.inner_ref())
        .await
        .map_err(AppError::SpecificOperationError)?;

        if res.rows_affected() < 1 {
            return Err(AppError::NoRowsAffectedError(
                "No user record has been created".into(),
            ));
        }

        Ok(user_id)
    }

    async fn find_all(&self) -> AppResult<Vec<User>> {
        sqlx::query_as::<_, UserRow>(
            r#"
            SELECT
                user_id,
                user_name,
                email,
                role
            FROM users
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(self.db.inner_ref())
        .await
        .map(|rows| rows.into_iter().map(User::from).collect())
        .map_err(AppError::SpecificOperationError)
    }

    async fn find_by_id(&self, user_id: UserId) -> AppResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT
                user_id,
                user_name,
                email,
                role
            FROM users
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(self.db.inner_ref())
        .await
        .map_err(AppError::SpecificOperationError)?;

        Ok(row.map(User::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel::model::role::Role;

    #[sqlx::test(migrations = "../migrations")]
    async fn test_register_user(pool: sqlx::PgPool) -> anyhow::Result<()> {
        let repo = UserRepositoryImpl::new(ConnectionPool::new(pool));

        let user_id = repo
            .create(CreateUser {
                user_name: "sato".into(),
                email: "sato@example.ac.jp".into(),
                role: Role::Member,
            })
            .await?;

        let user = repo.find_by_id(user_id).await?.unwrap();
        assert_eq!(user.user_name, "sato");
        assert_eq!(user.email, "sato@example.ac.jp");
        assert_eq!(user.role, Role::Member);

        // 同じメールアドレスでは登録できない
        let res = repo
            .create(CreateUser {
                user_name: "another sato".into(),
                email: "sato@example.ac.jp".into(),
                role: Role::Member,
            })
            .await;
        assert!(matches!(res, Err(AppError::ResourceConflict(_))));

        Ok(())
    }
}
