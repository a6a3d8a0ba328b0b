//! Get a user profile.

use axum::extract::{Path, State};
use axum::{Extension, Json};
use uuid::Uuid;

use crate::user::{Role, User};
use crate::{AppState, ServerError};

/// Handler to read one profile. Restricted to the profile owner and
/// administrators.
pub async fn handler(
    State(state): State<AppState>,
    Extension(caller): Extension<User>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<User>, ServerError> {
    if caller.role != Role::Admin && caller.id != user_id {
        return Err(ServerError::Forbidden {
            details: "You can only view your own profile.".into(),
        });
    }

    let user = state.user_service().find(user_id).await?;

    Ok(Json(user))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use http_body_util::BodyExt;

    use super::*;
    use crate::router::tests::person;
    use crate::{app, make_request, router};

    #[tokio::test]
    async fn test_get_own_profile() {
        let state = router::state();
        let app = app(state.clone());

        let user = person("ana", Role::Member, Default::default());
        let token = router::login_as(&state, &user).await;

        let response = make_request(
            Some(&token),
            app,
            Method::GET,
            &format!("/users/{}", user.id),
            String::new(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["id"], user.id.to_string());
        assert_eq!(body["email"], "ana@example.com");
        // The password hash never leaves the server.
        assert!(body.get("password").is_none());
    }

    #[tokio::test]
    async fn test_get_other_profile_requires_admin() {
        let state = router::state();
        let app = app(state.clone());

        let member = person("ana", Role::Member, Default::default());
        let other = person("bob", Role::Member, Default::default());
        let admin = person("root", Role::Admin, Default::default());
        let member_token = router::login_as(&state, &member).await;
        let admin_token = router::login_as(&state, &admin).await;
        state.users.insert(&other).await.unwrap();

        let path = format!("/users/{}", other.id);
        let response = make_request(
            Some(&member_token),
            app.clone(),
            Method::GET,
            &path,
            String::new(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response =
            make_request(Some(&admin_token), app, Method::GET, &path, String::new())
                .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_get_requires_token() {
        let state = router::state();
        let app = app(state);

        let response = make_request(
            None,
            app,
            Method::GET,
            &format!("/users/{}", uuid::Uuid::new_v4()),
            String::new(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
