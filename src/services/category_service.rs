use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use std::collections::HashMap;
use uuid::Uuid;

use crate::dto::categories::{
    CategoryNode, CategoryTree, CategoryWithProducts, CreateCategoryRequest,
    UpdateCategoryRequest,
};
use crate::dto::products::ProductList;
use crate::services::product_service::product_from_entity;
use crate::{
    audit::log_audit,
    entity::{
        categories::{
            ActiveModel as CategoryActive, Column as CategoryCol, Entity as Categories,
            Model as CategoryModel,
        },
        products::{Column as ProdCol, Entity as Products},
    },
    error::{AppError, AppResult, FieldError},
    middleware::auth::{AuthUser, ensure_admin},
    models::Category,
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    state::AppState,
};

pub async fn list_category_tree(state: &AppState) -> AppResult<ApiResponse<CategoryTree>> {
    let all = Categories::find()
        .order_by_asc(CategoryCol::Name)
        .all(&state.orm)
        .await?;

    let tree = build_tree(all.into_iter().map(category_from_entity).collect());
    Ok(ApiResponse::success(
        "Categories",
        tree,
        Some(Meta::empty()),
    ))
}

pub async fn get_category(
    state: &AppState,
    id: Uuid,
    pagination: Pagination,
) -> AppResult<ApiResponse<CategoryWithProducts>> {
    let category = Categories::find_by_id(id).one(&state.orm).await?;
    let category = match category {
        Some(c) => c,
        None => return Err(AppError::NotFound),
    };

    let (page, limit, offset) = pagination.normalize();
    let finder = Products::find().filter(
        Condition::all()
            .add(ProdCol::CategoryId.eq(id))
            .add(ProdCol::IsActive.eq(true)),
    );

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .order_by_desc(ProdCol::CreatedAt)
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(product_from_entity)
        .collect();

    let data = CategoryWithProducts {
        category: category_from_entity(category),
        products: ProductList { items },
    };
    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Category", data, Some(meta)))
}

pub async fn create_category(
    state: &AppState,
    user: &AuthUser,
    payload: CreateCategoryRequest,
) -> AppResult<ApiResponse<Category>> {
    ensure_admin(user)?;
    validate_category_fields(&payload.name, &payload.slug)?;

    let duplicate = Categories::find()
        .filter(CategoryCol::Slug.eq(payload.slug.clone()))
        .one(&state.orm)
        .await?;
    if duplicate.is_some() {
        return Err(AppError::BadRequest("Slug is already taken".into()));
    }

    if let Some(parent_id) = payload.parent_id {
        let parent = Categories::find_by_id(parent_id).one(&state.orm).await?;
        if parent.is_none() {
            return Err(AppError::BadRequest("Parent category not found".into()));
        }
    }

    let category = CategoryActive {
        id: Set(Uuid::new_v4()),
        name: Set(payload.name),
        slug: Set(payload.slug),
        gender: Set(payload.gender),
        parent_id: Set(payload.parent_id),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "category_create",
        Some("categories"),
        Some(serde_json::json!({ "category_id": category.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Category created",
        category_from_entity(category),
        Some(Meta::empty()),
    ))
}

pub async fn update_category(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateCategoryRequest,
) -> AppResult<ApiResponse<Category>> {
    ensure_admin(user)?;
    let existing = Categories::find_by_id(id).one(&state.orm).await?;
    let existing = match existing {
        Some(c) => c,
        None => return Err(AppError::NotFound),
    };

    if let Some(slug) = payload.slug.as_ref() {
        let duplicate = Categories::find()
            .filter(
                Condition::all()
                    .add(CategoryCol::Slug.eq(slug.clone()))
                    .add(CategoryCol::Id.ne(id)),
            )
            .one(&state.orm)
            .await?;
        if duplicate.is_some() {
            return Err(AppError::BadRequest("Slug is already taken".into()));
        }
    }

    if let Some(parent_id) = payload.parent_id {
        if parent_id == id {
            return Err(AppError::BadRequest(
                "Category cannot be its own parent".into(),
            ));
        }
        let parent = Categories::find_by_id(parent_id).one(&state.orm).await?;
        if parent.is_none() {
            return Err(AppError::BadRequest("Parent category not found".into()));
        }
    }

    let mut active: CategoryActive = existing.into();
    if let Some(name) = payload.name {
        active.name = Set(name);
    }
    if let Some(slug) = payload.slug {
        active.slug = Set(slug);
    }
    if let Some(gender) = payload.gender {
        active.gender = Set(Some(gender));
    }
    if let Some(parent_id) = payload.parent_id {
        active.parent_id = Set(Some(parent_id));
    }

    let category = active.update(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "category_update",
        Some("categories"),
        Some(serde_json::json!({ "category_id": category.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Updated",
        category_from_entity(category),
        Some(Meta::empty()),
    ))
}

/// Assemble root categories with up to two levels of children below them.
fn build_tree(categories: Vec<Category>) -> CategoryTree {
    let mut by_parent: HashMap<Uuid, Vec<Category>> = HashMap::new();
    let mut roots: Vec<Category> = Vec::new();

    for category in categories {
        match category.parent_id {
            Some(parent_id) => by_parent.entry(parent_id).or_default().push(category),
            None => roots.push(category),
        }
    }

    let roots = roots
        .into_iter()
        .map(|root| {
            let children = by_parent
                .remove(&root.id)
                .unwrap_or_default()
                .into_iter()
                .map(|child| {
                    let grandchildren = by_parent
                        .remove(&child.id)
                        .unwrap_or_default()
                        .into_iter()
                        .map(|grandchild| CategoryNode {
                            category: grandchild,
                            children: Vec::new(),
                        })
                        .collect();
                    CategoryNode {
                        category: child,
                        children: grandchildren,
                    }
                })
                .collect();
            CategoryNode {
                category: root,
                children,
            }
        })
        .collect();

    CategoryTree { roots }
}

fn validate_category_fields(name: &str, slug: &str) -> Result<(), AppError> {
    let mut errors = Vec::new();
    if name.trim().is_empty() {
        errors.push(FieldError::new("name", "must not be empty"));
    }
    if slug.trim().is_empty() || slug.contains(char::is_whitespace) {
        errors.push(FieldError::new("slug", "must be a non-empty slug"));
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(errors))
    }
}

fn category_from_entity(model: CategoryModel) -> Category {
    Category {
        id: model.id,
        name: model.name,
        slug: model.slug,
        gender: model.gender,
        parent_id: model.parent_id,
        created_at: model.created_at.with_timezone(&Utc),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn category(name: &str, parent_id: Option<Uuid>) -> Category {
        Category {
            id: Uuid::new_v4(),
            name: name.into(),
            slug: name.to_lowercase(),
            gender: None,
            parent_id,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn tree_nests_two_levels_of_children() {
        let root = category("Shoes", None);
        let child = category("Sneakers", Some(root.id));
        let grandchild = category("Running", Some(child.id));
        let great_grandchild = category("Trail", Some(grandchild.id));

        let tree = build_tree(vec![root, child, grandchild, great_grandchild]);

        assert_eq!(tree.roots.len(), 1);
        let child_node = &tree.roots[0].children[0];
        assert_eq!(child_node.category.name, "Sneakers");
        let grandchild_node = &child_node.children[0];
        assert_eq!(grandchild_node.category.name, "Running");
        // Depth stops at two levels below the root.
        assert!(grandchild_node.children.is_empty());
    }

    #[test]
    fn orphanless_roots_have_no_children() {
        let tree = build_tree(vec![category("Accessories", None)]);
        assert_eq!(tree.roots.len(), 1);
        assert!(tree.roots[0].children.is_empty());
    }

    #[test]
    fn category_detail_formats_for_logging() {
        let detail = CategoryWithProducts {
            category: category("Shoes", None),
            products: ProductList { items: Vec::new() },
        };
        let rendered = format!("{detail:?}");
        assert!(rendered.contains("Shoes"));
    }

    #[test]
    fn slug_with_whitespace_is_rejected() {
        assert!(validate_category_fields("Shoes", "running shoes").is_err());
        assert!(validate_category_fields("Shoes", "running-shoes").is_ok());
    }
}
