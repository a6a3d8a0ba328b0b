use std::sync::Arc;

use chrono::{NaiveTime, Utc};
use uuid::Uuid;

use crate::crypto::PasswordManager;
use crate::error::{Result, ServerError};
use crate::user::{
    DayGroup, NotificationSettings, Role, User, UserStore,
};

/// User manager.
#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn UserStore>,
    pwd: Arc<PasswordManager>,
}

/// Registration payload, validated at the HTTP boundary.
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub password: String,
    pub role: Role,
    pub day_group: DayGroup,
}

/// Partial user update; `None` fields stay untouched.
#[derive(Default)]
pub struct UserPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub password: Option<String>,
    pub role: Option<Role>,
    pub day_group: Option<DayGroup>,
    pub email_notifications: Option<bool>,
    pub sms_notifications: Option<bool>,
    pub reminder_time: Option<NaiveTime>,
}

impl UserService {
    /// Create a new [`UserService`].
    pub fn new(store: Arc<dyn UserStore>, pwd: Arc<PasswordManager>) -> Self {
        Self { store, pwd }
    }

    /// Register a new user with hashed password and default notification
    /// settings.
    pub async fn register(&self, new: NewUser) -> Result<User> {
        if self
            .store
            .find_by_email_or_phone(&new.email, &new.phone)
            .await?
            .is_some()
        {
            return Err(ServerError::Conflict {
                details: "User already exists.".into(),
            });
        }

        let user = User {
            id: Uuid::new_v4(),
            name: new.name,
            email: new.email,
            phone: new.phone,
            password: self.pwd.hash_password(&new.password)?,
            role: new.role,
            day_group: new.day_group,
            notifications: NotificationSettings::default(),
            created_at: Utc::now(),
        };
        self.store.insert(&user).await?;

        tracing::info!(
            user_id = %user.id,
            role = user.role.as_str(),
            group = user.day_group.as_str(),
            "user registered"
        );

        Ok(user)
    }

    /// Check credentials. Unknown email and wrong password are
    /// indistinguishable to the caller.
    pub async fn authenticate(
        &self,
        email: &str,
        password: &str,
    ) -> Result<User> {
        let Some(user) = self.store.find_by_email(email).await? else {
            return Err(ServerError::Unauthorized);
        };

        self.pwd
            .verify_password(password, &user.password)
            .map_err(|_| ServerError::Unauthorized)?;

        Ok(user)
    }

    /// Find a user using `id` field.
    pub async fn find(&self, id: Uuid) -> Result<User> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or(ServerError::NotFound { resource: "user" })
    }

    /// Every known user.
    pub async fn list(&self) -> Result<Vec<User>> {
        self.store.list().await
    }

    /// Apply a partial update on behalf of `actor`.
    ///
    /// Admins may patch anyone and any field. Other callers may patch their
    /// own profile, except role and group.
    pub async fn update(
        &self,
        actor: &User,
        id: Uuid,
        patch: UserPatch,
    ) -> Result<User> {
        if actor.role != Role::Admin {
            if actor.id != id {
                return Err(ServerError::Forbidden {
                    details: "You can only update your own profile.".into(),
                });
            }
            if patch.role.is_some() || patch.day_group.is_some() {
                return Err(ServerError::Forbidden {
                    details: "Role and group changes require an administrator."
                        .into(),
                });
            }
        }

        let mut user = self.find(id).await?;

        if patch.email.is_some() || patch.phone.is_some() {
            let email = patch.email.as_deref().unwrap_or(&user.email);
            let phone = patch.phone.as_deref().unwrap_or(&user.phone);
            if let Some(existing) =
                self.store.find_by_email_or_phone(email, phone).await?
            {
                if existing.id != id {
                    return Err(ServerError::Conflict {
                        details: "Email or phone already in use.".into(),
                    });
                }
            }
        }

        if let Some(name) = patch.name {
            user.name = name;
        }
        if let Some(email) = patch.email {
            user.email = email;
        }
        if let Some(phone) = patch.phone {
            user.phone = phone;
        }
        if let Some(password) = patch.password {
            user.password = self.pwd.hash_password(&password)?;
        }
        if let Some(role) = patch.role {
            user.role = role;
        }
        if let Some(day_group) = patch.day_group {
            user.day_group = day_group;
        }
        if let Some(email_notifications) = patch.email_notifications {
            user.notifications.email = email_notifications;
        }
        if let Some(sms_notifications) = patch.sms_notifications {
            user.notifications.sms = sms_notifications;
        }
        if let Some(reminder_time) = patch.reminder_time {
            user.notifications.reminder_time = reminder_time;
        }

        self.store.update(&user).await?;

        Ok(user)
    }

    /// Administrative removal.
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        if !self.store.delete(id).await? {
            return Err(ServerError::NotFound { resource: "user" });
        }

        tracing::info!(user_id = %id, "user deleted");

        Ok(())
    }
}
