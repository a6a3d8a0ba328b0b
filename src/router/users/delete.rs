//! Remove a user account.

use axum::extract::{Path, State};
use axum::Extension;
use uuid::Uuid;

use crate::router::require_admin;
use crate::user::User;
use crate::{AppState, ServerError};

/// Handler to delete a user. Administrators only.
pub async fn handler(
    State(state): State<AppState>,
    Extension(caller): Extension<User>,
    Path(user_id): Path<Uuid>,
) -> Result<(), ServerError> {
    require_admin(&caller)?;

    state.user_service().delete(user_id).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};

    use crate::router::tests::person;
    use crate::user::{DayGroup, Role};
    use crate::{app, make_request, router};

    #[tokio::test]
    async fn test_delete_is_admin_only() {
        let state = router::state();
        let app = app(state.clone());

        let member = person("ana", Role::Member, DayGroup::Monday);
        let admin = person("root", Role::Admin, DayGroup::Monday);
        let member_token = router::login_as(&state, &member).await;
        let admin_token = router::login_as(&state, &admin).await;

        let path = format!("/users/{}", member.id);
        let response = make_request(
            Some(&member_token),
            app.clone(),
            Method::DELETE,
            &path,
            String::new(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = make_request(
            Some(&admin_token),
            app.clone(),
            Method::DELETE,
            &path,
            String::new(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(state.users.find_by_id(member.id).await.unwrap().is_none());

        // Deleting again is a 404.
        let response = make_request(
            Some(&admin_token),
            app,
            Method::DELETE,
            &path,
            String::new(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
