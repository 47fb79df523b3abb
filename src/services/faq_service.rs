use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, EntityTrait, QueryOrder, Set};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::faqs::{CreateFaqRequest, FaqList, UpdateFaqRequest},
    entity::faqs::{ActiveModel as FaqActive, Column, Entity as Faqs, Model as FaqModel},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::Faq,
    response::{ApiResponse, Meta},
    state::AppState,
};

pub async fn list_faqs(state: &AppState) -> AppResult<ApiResponse<FaqList>> {
    let items = Faqs::find()
        .order_by_asc(Column::Position)
        .order_by_asc(Column::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(faq_from_entity)
        .collect();

    Ok(ApiResponse::success(
        "FAQs",
        FaqList { items },
        Some(Meta::empty()),
    ))
}

pub async fn create_faq(
    state: &AppState,
    user: &AuthUser,
    payload: CreateFaqRequest,
) -> AppResult<ApiResponse<Faq>> {
    ensure_admin(user)?;

    let faq = FaqActive {
        id: Set(Uuid::new_v4()),
        question: Set(payload.question),
        answer: Set(payload.answer),
        position: Set(payload.position.unwrap_or(0)),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "faq_create",
        Some("faqs"),
        Some(serde_json::json!({ "faq_id": faq.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "FAQ created",
        faq_from_entity(faq),
        Some(Meta::empty()),
    ))
}

pub async fn update_faq(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateFaqRequest,
) -> AppResult<ApiResponse<Faq>> {
    ensure_admin(user)?;

    let existing = Faqs::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut active: FaqActive = existing.into();
    if let Some(question) = payload.question {
        active.question = Set(question);
    }
    if let Some(answer) = payload.answer {
        active.answer = Set(answer);
    }
    if let Some(position) = payload.position {
        active.position = Set(position);
    }
    let faq = active.update(&state.orm).await?;

    Ok(ApiResponse::success(
        "FAQ updated",
        faq_from_entity(faq),
        Some(Meta::empty()),
    ))
}

pub async fn delete_faq(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;

    let result = Faqs::delete_by_id(id).exec(&state.orm).await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

fn faq_from_entity(model: FaqModel) -> Faq {
    Faq {
        id: model.id,
        question: model.question,
        answer: model.answer,
        position: model.position,
        created_at: model.created_at.with_timezone(&Utc),
    }
}
