//! Handle database requests for users.

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::error::Result;
use crate::user::{DayGroup, NotificationSettings, Role, User};

const USER_COLUMNS: &str = "id, name, email, phone, password, role, \
     day_group, email_notifications, sms_notifications, reminder_time, \
     last_reminder, created_at";

/// Storage port for [`User`] rows.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert [`User`] into storage.
    async fn insert(&self, user: &User) -> Result<()>;

    /// Find a user using `id` field.
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>>;

    /// Find a user using `email` field.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Duplicate probe used at registration: either field matching is a hit.
    async fn find_by_email_or_phone(
        &self,
        email: &str,
        phone: &str,
    ) -> Result<Option<User>>;

    /// Every known user.
    async fn list(&self) -> Result<Vec<User>>;

    /// Users of one weekday group, optionally restricted to a role.
    async fn list_by_group(
        &self,
        group: DayGroup,
        role: Option<Role>,
    ) -> Result<Vec<User>>;

    /// Overwrite a stored user. `last_reminder` is managed separately.
    async fn update(&self, user: &User) -> Result<()>;

    /// Remove a user. Returns whether a row was removed.
    async fn delete(&self, id: Uuid) -> Result<bool>;

    /// Users whose reminder preference equals `time_of_day` and whose last
    /// reminder is absent or predates `day_start`.
    async fn due_reminders(
        &self,
        time_of_day: NaiveTime,
        day_start: DateTime<Utc>,
    ) -> Result<Vec<User>>;

    /// Advance the last-reminder watermark for a user.
    async fn record_reminder(&self, id: Uuid, at: DateTime<Utc>) -> Result<()>;
}

/// PostgreSQL-backed [`UserStore`].
#[derive(Clone)]
pub struct PgUserStore {
    pool: Pool<Postgres>,
}

/// Flat row shape; enum labels decode during conversion.
#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    phone: String,
    password: String,
    role: String,
    day_group: String,
    email_notifications: bool,
    sms_notifications: bool,
    reminder_time: NaiveTime,
    last_reminder: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = sqlx::Error;

    fn try_from(row: UserRow) -> std::result::Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            name: row.name,
            email: row.email,
            phone: row.phone,
            password: row.password,
            role: row
                .role
                .parse()
                .map_err(|e: String| sqlx::Error::Decode(e.into()))?,
            day_group: row
                .day_group
                .parse()
                .map_err(|e: String| sqlx::Error::Decode(e.into()))?,
            notifications: NotificationSettings {
                email: row.email_notifications,
                sms: row.sms_notifications,
                reminder_time: row.reminder_time,
                last_reminder: row.last_reminder,
            },
            created_at: row.created_at,
        })
    }
}

impl PgUserStore {
    /// Create a new [`PgUserStore`].
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    async fn fetch_all(&self, query: String) -> Result<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&query)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| User::try_from(row).map_err(Into::into))
            .collect()
    }
}

#[derive(Debug, Clone)]
enum Field {
    Id,
    Email,
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Field::Id => write!(f, "id"),
            Field::Email => write!(f, "email"),
        }
    }
}

fn get_by_field_query(field: Field) -> String {
    format!("SELECT {USER_COLUMNS} FROM users WHERE {field} = $1")
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn insert(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO users (id, name, email, phone, password, role,
                day_group, email_notifications, sms_notifications,
                reminder_time, last_reminder, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"#,
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(&user.password)
        .bind(user.role.as_str())
        .bind(user.day_group.as_str())
        .bind(user.notifications.email)
        .bind(user.notifications.sms)
        .bind(user.notifications.reminder_time)
        .bind(user.notifications.last_reminder)
        .bind(user.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&get_by_field_query(Field::Id))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(User::try_from).transpose()?)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let row =
            sqlx::query_as::<_, UserRow>(&get_by_field_query(Field::Email))
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(User::try_from).transpose()?)
    }

    async fn find_by_email_or_phone(
        &self,
        email: &str,
        phone: &str,
    ) -> Result<Option<User>> {
        let query = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1 OR phone = $2"
        );
        let row = sqlx::query_as::<_, UserRow>(&query)
            .bind(email)
            .bind(phone)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(User::try_from).transpose()?)
    }

    async fn list(&self) -> Result<Vec<User>> {
        self.fetch_all(format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY name"
        ))
        .await
    }

    async fn list_by_group(
        &self,
        group: DayGroup,
        role: Option<Role>,
    ) -> Result<Vec<User>> {
        let mut query = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE day_group = $1"
        );

        let rows = match role {
            Some(role) => {
                query.push_str(" AND role = $2 ORDER BY name");
                sqlx::query_as::<_, UserRow>(&query)
                    .bind(group.as_str())
                    .bind(role.as_str())
                    .fetch_all(&self.pool)
                    .await?
            },
            None => {
                query.push_str(" ORDER BY name");
                sqlx::query_as::<_, UserRow>(&query)
                    .bind(group.as_str())
                    .fetch_all(&self.pool)
                    .await?
            },
        };

        rows.into_iter()
            .map(|row| User::try_from(row).map_err(Into::into))
            .collect()
    }

    async fn update(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"UPDATE users
                SET name = $1, email = $2, phone = $3, password = $4,
                    role = $5, day_group = $6, email_notifications = $7,
                    sms_notifications = $8, reminder_time = $9
                WHERE id = $10"#,
        )
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(&user.password)
        .bind(user.role.as_str())
        .bind(user.day_group.as_str())
        .bind(user.notifications.email)
        .bind(user.notifications.sms)
        .bind(user.notifications.reminder_time)
        .bind(user.id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn due_reminders(
        &self,
        time_of_day: NaiveTime,
        day_start: DateTime<Utc>,
    ) -> Result<Vec<User>> {
        let query = format!(
            "SELECT {USER_COLUMNS} FROM users
                WHERE reminder_time = $1
                AND (last_reminder IS NULL OR last_reminder < $2)"
        );
        let rows = sqlx::query_as::<_, UserRow>(&query)
            .bind(time_of_day)
            .bind(day_start)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| User::try_from(row).map_err(Into::into))
            .collect()
    }

    async fn record_reminder(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE users SET last_reminder = $1 WHERE id = $2")
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

/// In-memory [`UserStore`] with the same semantics as Postgres.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryUserStore {
    users: std::sync::Mutex<std::collections::HashMap<Uuid, User>>,
}

#[cfg(test)]
#[async_trait]
impl UserStore for MemoryUserStore {
    async fn insert(&self, user: &User) -> Result<()> {
        self.users.lock().unwrap().insert(user.id, user.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.users.lock().unwrap().get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn find_by_email_or_phone(
        &self,
        email: &str,
        phone: &str,
    ) -> Result<Option<User>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .find(|u| u.email == email || u.phone == phone)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<User>> {
        let mut users: Vec<User> =
            self.users.lock().unwrap().values().cloned().collect();
        users.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(users)
    }

    async fn list_by_group(
        &self,
        group: DayGroup,
        role: Option<Role>,
    ) -> Result<Vec<User>> {
        let mut users: Vec<User> = self
            .users
            .lock()
            .unwrap()
            .values()
            .filter(|u| u.day_group == group)
            .filter(|u| role.is_none_or(|r| u.role == r))
            .cloned()
            .collect();
        users.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(users)
    }

    async fn update(&self, user: &User) -> Result<()> {
        let mut users = self.users.lock().unwrap();
        if let Some(stored) = users.get_mut(&user.id) {
            let last_reminder = stored.notifications.last_reminder;
            *stored = user.clone();
            stored.notifications.last_reminder = last_reminder;
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.users.lock().unwrap().remove(&id).is_some())
    }

    async fn due_reminders(
        &self,
        time_of_day: NaiveTime,
        day_start: DateTime<Utc>,
    ) -> Result<Vec<User>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .filter(|u| u.notifications.reminder_time == time_of_day)
            .filter(|u| {
                u.notifications
                    .last_reminder
                    .is_none_or(|at| at < day_start)
            })
            .cloned()
            .collect())
    }

    async fn record_reminder(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        if let Some(user) = self.users.lock().unwrap().get_mut(&id) {
            user.notifications.last_reminder = Some(at);
        }
        Ok(())
    }
}
