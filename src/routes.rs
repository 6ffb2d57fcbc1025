use std::sync::Arc;
use actix_web::{web, HttpResponse};

use crate::error::ApiError;
use crate::models::*;
use crate::repo::Repo;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(
                web::resource("/posts")
                    .route(web::get().to(list_posts))
                    .route(web::post().to(create_post)),
            )
            .service(web::resource("/posts/{id}").route(web::get().to(get_post)))
            .service(web::resource("/posts/{id}/comments").route(web::get().to(list_comments)))
            .service(
                web::resource("/comments")
                    .route(web::post().to(create_comment)),
            ),
    );
}

#[derive(Clone)]
pub struct AppState { pub repo: Arc<dyn Repo> }

#[utoipa::path(
    get,
    path = "/api/v1/posts",
    tag = "posts",
    responses(
        (status = 200, description = "All posts with their comment trees", body = [Post])
    )
)]
pub async fn list_posts(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let posts = data.repo.get_posts().await?;
    Ok(HttpResponse::Ok().json(posts))
}

#[utoipa::path(
    post,
    path = "/api/v1/posts",
    tag = "posts",
    request_body = NewPost,
    responses(
        (status = 201, description = "Post created", body = Post),
        (status = 400, description = "Missing title, content or author_id")
    )
)]
pub async fn create_post(
    data: web::Data<AppState>,
    payload: web::Json<NewPost>,
) -> Result<HttpResponse, ApiError> {
    let post = data.repo.create_post(payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(post))
}

#[utoipa::path(
    get,
    path = "/api/v1/posts/{id}",
    tag = "posts",
    params(("id" = uuid::Uuid, Path, description = "Post id")),
    responses(
        (status = 200, description = "Post with its full comment tree", body = Post),
        (status = 404, description = "Post not found")
    )
)]
pub async fn get_post(
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let post = data.repo.get_post_by_id(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(post))
}

#[utoipa::path(
    get,
    path = "/api/v1/posts/{id}/comments",
    tag = "comments",
    params(("id" = uuid::Uuid, Path, description = "Post id"), CommentQuery),
    responses(
        (status = 200, description = "One page of comments, threaded", body = CommentConnection)
    )
)]
pub async fn list_comments(
    data: web::Data<AppState>,
    path: web::Path<Id>,
    query: web::Query<CommentQuery>,
) -> Result<HttpResponse, ApiError> {
    let CommentQuery { limit, cursor } = query.into_inner();
    let cursor = match cursor.as_deref().filter(|c| !c.is_empty()) {
        None => None,
        Some(raw) => match raw.parse::<Id>() {
            Ok(id) => Some(id),
            // a malformed cursor can't name any comment: past the end
            Err(_) => return Ok(HttpResponse::Ok().json(CommentConnection::default())),
        },
    };
    let connection = data.repo.get_comments_for_post(path.into_inner(), limit, cursor).await?;
    Ok(HttpResponse::Ok().json(connection))
}

#[utoipa::path(
    post,
    path = "/api/v1/comments",
    tag = "comments",
    request_body = NewComment,
    responses(
        (status = 201, description = "Comment created", body = Comment),
        (status = 400, description = "Missing author_id or content"),
        (status = 403, description = "Comments are disabled for the post"),
        (status = 404, description = "Post or parent comment not found")
    )
)]
pub async fn create_comment(
    data: web::Data<AppState>,
    payload: web::Json<NewComment>,
) -> Result<HttpResponse, ApiError> {
    let comment = data.repo.add_comment(payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(comment))
}
