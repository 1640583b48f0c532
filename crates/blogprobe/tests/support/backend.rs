//! The blog JSON API served by axum over a `FakeStore`.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use blogprobe::fixture::{FakeStore, SeedBlog, SeedComment, SeedUser};
use serde_json::{json, Value};

pub const TOKEN: &str = "backend-admin-token";

type Reply = (StatusCode, Json<Value>);

fn reply(status: StatusCode, body: Value) -> Reply {
    (status, Json(body))
}

fn error(status: StatusCode, message: &str) -> Reply {
    reply(status, json!({ "error": message }))
}

fn text<'a>(body: &'a Value, field: &str) -> Option<&'a str> {
    body.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

fn authorized(headers: &HeaderMap) -> Option<bool> {
    let header = headers.get("authorization")?.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?;
    Some(token == TOKEN)
}

fn blog_json(blog: &SeedBlog) -> Value {
    json!({
        "id": blog.id,
        "title": blog.title,
        "content": blog.content,
        "excerpt": blog.excerpt,
        "category": blog.category,
        "likes": blog.likes,
        "views": blog.views,
        "status": if blog.published { "published" } else { "draft" },
        "createdAt": chrono::Utc::now().to_rfc3339(),
    })
}

async fn login(State(store): State<FakeStore>, Json(body): Json<Value>) -> Reply {
    let username = text(&body, "username").unwrap_or_default();
    let password = text(&body, "password").unwrap_or_default();
    let valid = store.with(|d| {
        d.users
            .iter()
            .any(|u| u.username == username && u.password == password)
    });
    if valid {
        reply(StatusCode::OK, json!({ "token": TOKEN, "user": { "username": username } }))
    } else {
        error(StatusCode::UNAUTHORIZED, "Invalid credentials")
    }
}

async fn register(State(store): State<FakeStore>, Json(body): Json<Value>) -> Reply {
    let (Some(username), Some(password)) = (text(&body, "username"), text(&body, "password"))
    else {
        return error(StatusCode::BAD_REQUEST, "Username and password are required");
    };
    store.with(|d| {
        if d.users.iter().any(|u| u.username == username) {
            return error(StatusCode::CONFLICT, "Username already exists");
        }
        d.users.push(SeedUser {
            username: username.to_string(),
            password: password.to_string(),
            role: "user".to_string(),
        });
        reply(StatusCode::CREATED, json!({ "message": "User registered successfully" }))
    })
}

async fn list_blogs(State(store): State<FakeStore>) -> Reply {
    let blogs: Vec<Value> = store.with(|d| d.blogs.iter().map(blog_json).collect());
    reply(StatusCode::OK, Value::Array(blogs))
}

async fn create_blog(
    State(store): State<FakeStore>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    match authorized(&headers) {
        None => return error(StatusCode::UNAUTHORIZED, "No token provided"),
        Some(false) => return error(StatusCode::FORBIDDEN, "Invalid token"),
        Some(true) => {}
    }
    for field in ["title", "content", "category", "excerpt"] {
        if text(&body, field).is_none() {
            return error(StatusCode::BAD_REQUEST, &format!("{field} is required"));
        }
    }
    let blog = store.with(|d| {
        let blog = SeedBlog {
            id: d.blogs.iter().map(|b| b.id).max().unwrap_or(0) + 1,
            title: text(&body, "title").unwrap_or_default().to_string(),
            content: text(&body, "content").unwrap_or_default().to_string(),
            excerpt: text(&body, "excerpt").unwrap_or_default().to_string(),
            category: text(&body, "category").unwrap_or_default().to_string(),
            likes: 0,
            views: 0,
            published: text(&body, "status") != Some("draft"),
        };
        d.blogs.push(blog.clone());
        blog
    });
    reply(StatusCode::CREATED, blog_json(&blog))
}

async fn get_blog(State(store): State<FakeStore>, Path(id): Path<u64>) -> Reply {
    store.with(|d| d.blog(id).map(blog_json)).map_or_else(
        || error(StatusCode::NOT_FOUND, "Blog not found"),
        |blog| reply(StatusCode::OK, blog),
    )
}

async fn get_public_blog(State(store): State<FakeStore>, Path(id): Path<u64>) -> Reply {
    let blog = store.with(|d| {
        let blog = d.blog_mut(id).filter(|b| b.published)?;
        blog.views += 1;
        Some(blog.clone())
    });
    blog.map_or_else(
        || error(StatusCode::NOT_FOUND, "Blog not found"),
        |blog| {
            reply(
                StatusCode::OK,
                json!({
                    "id": blog.id,
                    "title": blog.title,
                    "content": blog.content,
                    "views": blog.views,
                    "likes": blog.likes,
                }),
            )
        },
    )
}

async fn delete_blog(
    State(store): State<FakeStore>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Reply {
    if authorized(&headers) != Some(true) {
        return error(StatusCode::UNAUTHORIZED, "No token provided");
    }
    let removed = store.with(|d| {
        let before = d.blogs.len();
        d.blogs.retain(|b| b.id != id);
        d.comments.retain(|c| c.blog_id != id);
        before != d.blogs.len()
    });
    if removed {
        reply(StatusCode::OK, json!({ "message": "Blog deleted successfully" }))
    } else {
        error(StatusCode::NOT_FOUND, "Blog not found")
    }
}

async fn like_blog(State(store): State<FakeStore>, Path(id): Path<u64>) -> Reply {
    let likes = store.with(|d| {
        let blog = d.blog_mut(id)?;
        blog.likes += 1;
        Some(blog.likes)
    });
    likes.map_or_else(
        || error(StatusCode::NOT_FOUND, "Blog not found"),
        |likes| reply(StatusCode::OK, json!({ "likes": likes })),
    )
}

fn comment_from(body: &Value) -> Result<SeedComment, Reply> {
    let blog_id = body.get("blogId").and_then(Value::as_u64);
    let content = text(body, "content");
    let author = text(body, "authorName");
    match (blog_id, content, author) {
        (Some(blog_id), Some(content), Some(author)) => Ok(SeedComment {
            blog_id,
            author: author.to_string(),
            content: content.to_string(),
        }),
        _ => Err(error(
            StatusCode::BAD_REQUEST,
            "blogId, content and authorName are required",
        )),
    }
}

fn store_comment(store: &FakeStore, comment: SeedComment) -> Reply {
    let body = json!({
        "blogId": comment.blog_id,
        "authorName": comment.author,
        "content": comment.content,
    });
    store.with(|d| d.comments.push(comment));
    reply(StatusCode::CREATED, body)
}

async fn add_comment(State(store): State<FakeStore>, Json(body): Json<Value>) -> Reply {
    match comment_from(&body) {
        Ok(comment) => store_comment(&store, comment),
        Err(rejected) => rejected,
    }
}

async fn add_author_comment(
    State(store): State<FakeStore>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    match authorized(&headers) {
        None => return error(StatusCode::UNAUTHORIZED, "Unauthorized"),
        Some(false) => return error(StatusCode::FORBIDDEN, "Invalid token"),
        Some(true) => {}
    }
    match comment_from(&body) {
        Ok(comment) => store_comment(&store, comment),
        Err(rejected) => rejected,
    }
}

/// Router for the blog API
pub fn router(store: FakeStore) -> Router {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/register", post(register))
        .route("/api/blogs", get(list_blogs).post(create_blog))
        .route("/api/blogs/public/{id}", get(get_public_blog))
        .route("/api/blogs/{id}", get(get_blog).delete(delete_blog))
        .route("/api/blogs/{id}/like", post(like_blog))
        .route("/api/comments", post(add_comment))
        .route("/api/comments/author", post(add_author_comment))
        .with_state(store)
}

/// Serve the API on an ephemeral port and return its base URL
pub async fn spawn_backend(store: FakeStore) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(store)).await.unwrap();
    });
    format!("http://{addr}")
}
