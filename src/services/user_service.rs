use chrono::Utc;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};

use crate::{
    audit::log_audit,
    entity::users::{ActiveModel as UserActive, Entity as Users, Model as UserModel},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ROLE_SELLER, ROLE_USER},
    models::User,
    response::{ApiResponse, Meta},
    state::AppState,
};

pub async fn get_profile(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<User>> {
    let found = Users::find_by_id(user.user_id).one(&state.orm).await?;
    let found = match found {
        Some(u) => u,
        None => return Err(AppError::NotFound),
    };

    Ok(ApiResponse::success(
        "Profile",
        user_from_entity(found),
        None,
    ))
}

pub async fn become_seller(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<User>> {
    let found = Users::find_by_id(user.user_id).one(&state.orm).await?;
    let found = match found {
        Some(u) => u,
        None => return Err(AppError::NotFound),
    };

    if found.role != ROLE_USER {
        return Err(AppError::BadRequest(format!(
            "Role {} cannot become a seller",
            found.role
        )));
    }

    let mut active: UserActive = found.into();
    active.role = Set(ROLE_SELLER.to_string());
    let updated = active.update(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(updated.id),
        "become_seller",
        Some("users"),
        Some(serde_json::json!({ "user_id": updated.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Seller role granted",
        user_from_entity(updated),
        Some(Meta::empty()),
    ))
}

pub fn user_from_entity(model: UserModel) -> User {
    User {
        id: model.id,
        email: model.email,
        name: model.name,
        role: model.role,
        created_at: model.created_at.with_timezone(&Utc),
    }
}
