#![cfg(feature = "inmem-store")]

use postline::{
    models::{Comment, CommentNode, NewComment, NewPost, Post},
    repo::{inmem::InMemRepo, RepoError},
};
// Bring trait method namespaces into scope so calls on InMemRepo resolve.
use postline::repo::{CommentRepo, PostRepo};
use uuid::Uuid;

/// Helper that returns a fresh, empty repository for every test run.
fn repo() -> InMemRepo {
    InMemRepo::new()
}

async fn post(r: &InMemRepo, comments_disabled: bool) -> Post {
    r.create_post(NewPost {
        title: "Hello".into(),
        content: "First post".into(),
        author_id: "alice".into(),
        comments_disabled,
    })
    .await
    .unwrap()
}

async fn comment(r: &InMemRepo, post_id: Uuid, parent_id: Option<Uuid>, content: &str) -> Comment {
    r.add_comment(NewComment {
        post_id,
        parent_id,
        author_id: "bob".into(),
        content: content.into(),
    })
    .await
    .unwrap()
}

fn root_ids(nodes: &[CommentNode]) -> Vec<Uuid> {
    nodes.iter().map(|n| n.id).collect()
}

#[tokio::test]
async fn create_post_requires_every_field() {
    let r = repo();
    for (title, content, author) in [("", "c", "a"), ("t", "", "a"), ("t", "c", "")] {
        let err = r
            .create_post(NewPost {
                title: title.into(),
                content: content.into(),
                author_id: author.into(),
                comments_disabled: false,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::Validation(_)));
    }
    assert!(r.get_posts().await.unwrap().is_empty());

    let p = post(&r, false).await;
    assert_eq!(p.title, "Hello");
    assert!(!p.comments_disabled);
    assert!(p.comments.is_empty());
}

#[tokio::test]
async fn reply_is_nested_under_its_parent() {
    let r = repo();
    let p = post(&r, false).await;

    let c1 = comment(&r, p.id, None, "a").await;
    let c2 = comment(&r, p.id, Some(c1.id), "b").await;
    assert_eq!(c2.parent_id, Some(c1.id));
    assert!(c1.created_at < c2.created_at);

    let conn = r.get_comments_for_post(p.id, Some(10), None).await.unwrap();
    assert_eq!(root_ids(&conn.edges), vec![c1.id]);
    assert_eq!(root_ids(&conn.edges[0].replies), vec![c2.id]);
    assert!(!conn.page_info.has_next_page);
    assert_eq!(conn.page_info.end_cursor, Some(c2.id));
}

#[tokio::test]
async fn disabled_post_rejects_comments() {
    let r = repo();
    let p = post(&r, true).await;
    let err = r
        .add_comment(NewComment {
            post_id: p.id,
            parent_id: None,
            author_id: "bob".into(),
            content: "hi".into(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::Forbidden(_)));
    assert!(r.get_post_by_id(p.id).await.unwrap().comments.is_empty());
}

#[tokio::test]
async fn add_comment_error_cases() {
    let r = repo();
    let p = post(&r, false).await;
    let other = post(&r, false).await;
    let foreign = comment(&r, other.id, None, "elsewhere").await;

    let new = |post_id, parent_id, author: &str, content: &str| NewComment {
        post_id,
        parent_id,
        author_id: author.into(),
        content: content.into(),
    };

    // empty fields
    assert!(matches!(r.add_comment(new(p.id, None, "", "x")).await, Err(RepoError::Validation(_))));
    assert!(matches!(r.add_comment(new(p.id, None, "bob", "")).await, Err(RepoError::Validation(_))));
    // unknown post
    assert!(matches!(
        r.add_comment(new(Uuid::new_v4(), None, "bob", "x")).await,
        Err(RepoError::NotFound(_))
    ));
    // unknown parent
    assert!(matches!(
        r.add_comment(new(p.id, Some(Uuid::new_v4()), "bob", "x")).await,
        Err(RepoError::NotFound(_))
    ));
    // parent exists but on another post
    assert!(matches!(
        r.add_comment(new(p.id, Some(foreign.id), "bob", "x")).await,
        Err(RepoError::NotFound(_))
    ));
}

#[tokio::test]
async fn disabled_check_comes_before_parent_check() {
    let r = repo();
    let p = post(&r, true).await;
    let err = r
        .add_comment(NewComment {
            post_id: p.id,
            parent_id: Some(Uuid::new_v4()),
            author_id: "bob".into(),
            content: "x".into(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::Forbidden(_)));
}

#[tokio::test]
async fn cursor_pagination_over_roots() {
    let r = repo();
    let p = post(&r, false).await;
    let c1 = comment(&r, p.id, None, "1").await;
    let c2 = comment(&r, p.id, None, "2").await;
    let c3 = comment(&r, p.id, None, "3").await;

    let first = r.get_comments_for_post(p.id, Some(2), None).await.unwrap();
    assert_eq!(root_ids(&first.edges), vec![c1.id, c2.id]);
    assert!(first.page_info.has_next_page);
    assert_eq!(first.page_info.end_cursor, Some(c2.id));

    let second = r.get_comments_for_post(p.id, Some(2), Some(c2.id)).await.unwrap();
    assert_eq!(root_ids(&second.edges), vec![c3.id]);
    assert!(!second.page_info.has_next_page);
    assert_eq!(second.page_info.end_cursor, Some(c3.id));
}

#[tokio::test]
async fn walking_pages_reconstructs_all_comments() {
    let r = repo();
    let p = post(&r, false).await;
    let mut expected = Vec::new();
    for i in 0..10 {
        expected.push(comment(&r, p.id, None, &format!("c{i}")).await.id);
    }

    let mut seen = Vec::new();
    let mut cursor = None;
    loop {
        let page = r.get_comments_for_post(p.id, Some(3), cursor).await.unwrap();
        assert!(page.edges.len() <= 3);
        seen.extend(root_ids(&page.edges));
        if !page.page_info.has_next_page {
            break;
        }
        cursor = page.page_info.end_cursor;
    }
    assert_eq!(seen, expected);
}

#[tokio::test]
async fn unknown_cursor_and_unknown_post_are_empty() {
    let r = repo();
    let p = post(&r, false).await;
    comment(&r, p.id, None, "only").await;

    let page = r.get_comments_for_post(p.id, None, Some(Uuid::new_v4())).await.unwrap();
    assert!(page.edges.is_empty());
    assert!(!page.page_info.has_next_page);
    assert!(page.page_info.end_cursor.is_none());

    // a cursor from another post does not resume this one
    let other = post(&r, false).await;
    let foreign = comment(&r, other.id, None, "x").await;
    assert!(r.get_comments_for_post(p.id, None, Some(foreign.id)).await.unwrap().edges.is_empty());

    assert!(r.get_comments_for_post(Uuid::new_v4(), None, None).await.unwrap().edges.is_empty());
}

#[tokio::test]
async fn zero_limit_uses_default_cap() {
    let r = repo();
    let p = post(&r, false).await;
    for i in 0..5 {
        comment(&r, p.id, None, &format!("c{i}")).await;
    }
    let page = r.get_comments_for_post(p.id, Some(0), None).await.unwrap();
    assert_eq!(page.edges.len(), 5);
    assert!(!page.page_info.has_next_page);
}

#[tokio::test]
async fn reply_on_later_page_becomes_root() {
    let r = repo();
    let p = post(&r, false).await;
    let parent = comment(&r, p.id, None, "parent").await;
    let reply = comment(&r, p.id, Some(parent.id), "reply").await;

    let second = r.get_comments_for_post(p.id, Some(1), Some(parent.id)).await.unwrap();
    assert_eq!(root_ids(&second.edges), vec![reply.id]);
    assert_eq!(second.edges[0].parent_id, Some(parent.id));
}

#[tokio::test]
async fn get_post_by_id_attaches_full_tree() {
    let r = repo();
    let p = post(&r, false).await;
    let a = comment(&r, p.id, None, "a").await;
    let b = comment(&r, p.id, Some(a.id), "b").await;
    let c = comment(&r, p.id, Some(b.id), "c").await;
    let d = comment(&r, p.id, None, "d").await;

    let full = r.get_post_by_id(p.id).await.unwrap();
    assert_eq!(root_ids(&full.comments), vec![a.id, d.id]);
    assert_eq!(full.comments[0].replies[0].id, b.id);
    assert_eq!(full.comments[0].replies[0].replies[0].id, c.id);

    let err = r.get_post_by_id(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, RepoError::NotFound(_)));
}

#[tokio::test]
async fn get_posts_lists_in_creation_order_with_trees() {
    let r = repo();
    let first = post(&r, false).await;
    let second = post(&r, true).await;
    let c = comment(&r, first.id, None, "hi").await;

    let posts = r.get_posts().await.unwrap();
    assert_eq!(posts.iter().map(|p| p.id).collect::<Vec<_>>(), vec![first.id, second.id]);
    assert_eq!(root_ids(&posts[0].comments), vec![c.id]);
    assert!(posts[1].comments.is_empty());
}

#[tokio::test]
async fn clones_share_state() {
    let r = repo();
    let handle = r.clone();
    let p = post(&r, false).await;
    assert_eq!(handle.get_post_by_id(p.id).await.unwrap().id, p.id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers_all_land_in_order() {
    let r = repo();
    let p = post(&r, false).await;
    let root = comment(&r, p.id, None, "root").await;

    let tasks: Vec<_> = (0..64)
        .map(|i| {
            let r = r.clone();
            let parent = (i % 2 == 0).then_some(root.id);
            tokio::spawn(async move { comment(&r, p.id, parent, &format!("c{i}")).await })
        })
        .collect();
    let mut written = Vec::new();
    for t in tasks {
        written.push(t.await.unwrap().id);
    }

    let page = r.get_comments_for_post(p.id, None, None).await.unwrap();
    let full = r.get_post_by_id(p.id).await.unwrap();
    assert_eq!(full.comments.len(), 1 + 32);
    assert_eq!(full.comments[0].replies.len(), 32);
    assert!(!page.page_info.has_next_page);

    // one comment per page walks the flat order: every write is there, stamps strictly rise
    let mut seen = vec![(root.id, root.created_at)];
    let mut cursor = Some(root.id);
    while let Some(node) = r
        .get_comments_for_post(p.id, Some(1), cursor)
        .await
        .unwrap()
        .edges
        .into_iter()
        .next()
    {
        assert!(node.created_at > seen[seen.len() - 1].1);
        seen.push((node.id, node.created_at));
        cursor = Some(node.id);
    }
    assert_eq!(seen.len(), 65);
    for id in &written {
        assert!(seen.iter().any(|(seen_id, _)| seen_id == id));
    }
}
