use axum::extract::State;
use shared::{Ack, ActionResponse, Data, Page, ProductInput, ProductListQuery, ProductView};

use super::extract::{Json, Path, Query};
use super::auth::AdminUser;
use crate::{
    error::AppError,
    notify::{self, Event},
    state::AppState,
    storage::destroy_best_effort,
    validation::validate_product,
};

/// Product images are always uploaded as images.
const IMAGE_MIME: &str = "image/*";

async fn discard_image(state: &AppState, user_id: &str, url: &str) {
    let account = state.cdn_account_for(user_id).await.unwrap_or_else(|e| {
        tracing::warn!("Could not load storage account for {}: {}", user_id, e);
        None
    });
    destroy_best_effort(state.storage.as_ref(), [(url, IMAGE_MIME)], account.as_ref()).await;
}

pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductListQuery>,
) -> Result<Json<ActionResponse<Page<ProductView>>>, AppError> {
    let (products, total) = state.db.get_products(&query).await?;
    let items = products.into_iter().map(Into::into).collect();
    let (page, limit, _) = crate::db::page_window(query.page, query.limit);
    Ok(Json(ActionResponse::ok(Page::new(items, total, page, limit))))
}

pub async fn categories(
    State(state): State<AppState>,
) -> Result<Json<ActionResponse<Data<Vec<String>>>>, AppError> {
    let categories = state.db.get_product_categories().await?;
    Ok(Json(ActionResponse::ok(Data { data: categories })))
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ActionResponse<Data<ProductView>>>, AppError> {
    let product = state
        .db
        .get_product(&id)
        .await?
        .ok_or(AppError::NotFound("Product"))?;
    Ok(Json(ActionResponse::ok(Data {
        data: product.into(),
    })))
}

pub async fn create_product(
    State(state): State<AppState>,
    admin: AdminUser,
    Json(input): Json<ProductInput>,
) -> Result<Json<ActionResponse<Data<ProductView>>>, AppError> {
    validate_product(&input)?;
    let product = state.db.create_product(&input, admin.id()).await?;
    tracing::info!("Created product {} ({})", product.name, product.id);

    notify::notify_admins(&state, Event::Product(&product)).await;

    Ok(Json(ActionResponse::ok_with(
        "Product created",
        Data {
            data: product.into(),
        },
    )))
}

pub async fn update_product(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<String>,
    Json(input): Json<ProductInput>,
) -> Result<Json<ActionResponse<Data<ProductView>>>, AppError> {
    validate_product(&input)?;
    let previous = state
        .db
        .get_product(&id)
        .await?
        .ok_or(AppError::NotFound("Product"))?;
    let product = state
        .db
        .update_product(&id, &input)
        .await?
        .ok_or(AppError::NotFound("Product"))?;

    if let Some(old) = previous.image_url.as_deref() {
        if product.image_url.as_deref() != Some(old) {
            discard_image(&state, admin.id(), old).await;
        }
    }
    tracing::info!("Updated product {}", product.id);

    Ok(Json(ActionResponse::ok_with(
        "Product updated",
        Data {
            data: product.into(),
        },
    )))
}

pub async fn delete_product(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<String>,
) -> Result<Json<Ack>, AppError> {
    let product = state
        .db
        .get_product(&id)
        .await?
        .ok_or(AppError::NotFound("Product"))?;
    state.db.delete_product(&product.id).await?;
    if let Some(url) = product.image_url.as_deref() {
        discard_image(&state, admin.id(), url).await;
    }
    tracing::info!("Deleted product {}", product.id);
    Ok(Json(Ack::done("Product deleted")))
}
