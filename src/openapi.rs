use crate::models::{Comment, CommentConnection, CommentNode, NewComment, NewPost, PageInfo, Post};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::list_posts,
        crate::routes::create_post,
        crate::routes::get_post,
        crate::routes::list_comments,
        crate::routes::create_comment,
    ),
    components(schemas(
        Post, NewPost, Comment, NewComment, CommentNode, CommentConnection, PageInfo
    )),
    tags(
        (name = "posts", description = "Post operations"),
        (name = "comments", description = "Threaded comment operations"),
    )
)]
pub struct ApiDoc;
