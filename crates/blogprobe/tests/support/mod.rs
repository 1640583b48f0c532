//! Fakes shared by the integration tests: the blog client rendered on a
//! `VirtualPage` with MUI-style markup, and an axum copy of the JSON API.
//! Both read and write the same `FakeStore`.

#![allow(dead_code, clippy::unwrap_used)]

pub mod backend;

use blogprobe::dom::{El, EventContext, NodeId, PageState, VirtualPage};
use blogprobe::fixture::{Dataset, FakeStore, SeedBlog, SeedComment, SeedUser};
use blogprobe::oracle::{READ_BLOGS_KEY, THEME_KEY};
use blogprobe::{LocatorOptions, Page, ScenarioContext};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

pub const ORIGIN: &str = "http://blog.test";
pub const API: &str = "http://api.blog.test";
pub const PER_PAGE: usize = 8;
pub const CATEGORIES: [&str; 4] = ["Technology", "Travel", "Food", "Lifestyle"];
const LATENCY: Duration = Duration::from_millis(25);
const TOKEN: &str = "fake-admin-token";

/// One browser tab on the fake blog client
#[derive(Debug, Clone)]
pub struct BlogApp {
    pub vp: VirtualPage,
    pub page: Page,
    pub store: FakeStore,
}

impl BlogApp {
    /// Fresh store holding the seeded baseline
    pub fn seeded() -> Self {
        let store = FakeStore::new("blog-server");
        store.replace(Dataset::blog_baseline());
        Self::with_store(store)
    }

    /// New tab on an existing store
    pub fn with_store(store: FakeStore) -> Self {
        let vp = VirtualPage::new(ORIGIN);
        install(&vp, &store);
        let options = LocatorOptions {
            timeout: Duration::from_secs(3),
            ..LocatorOptions::default()
        };
        let page = Page::new(Arc::new(vp.clone()), ORIGIN).with_options(options);
        Self { vp, page, store }
    }

    pub fn context(&self) -> ScenarioContext {
        ScenarioContext::with_page(self.page.clone())
    }
}

// -----------------------------------------------------------------------------
// Helpers over page state
// -----------------------------------------------------------------------------

fn attr_of(state: &PageState, node: NodeId, name: &str) -> Option<String> {
    state
        .doc()
        .get(node)
        .and_then(|n| n.attr(name))
        .map(str::to_string)
}

fn first(state: &PageState, css: &str) -> Option<NodeId> {
    state.doc().query_css(css).unwrap().first().copied()
}

fn value_of(state: &PageState, css: &str) -> String {
    first(state, css)
        .and_then(|n| state.doc().input_value(n))
        .unwrap_or_default()
}

fn id_from(state: &PageState, ctx: &EventContext) -> u64 {
    attr_of(state, ctx.current, "data-id")
        .and_then(|v| v.parse().ok())
        .unwrap_or_default()
}

fn api(path: &str) -> String {
    format!("{API}{path}")
}

fn is_dark(state: &PageState) -> bool {
    state.storage(THEME_KEY).is_some_and(|t| t.contains("dark"))
}

fn read_ids(state: &PageState) -> Vec<u64> {
    state
        .storage(READ_BLOGS_KEY)
        .and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or_default()
}

fn remove_all(state: &mut PageState, css: &str) {
    for node in state.doc().query_css(css).unwrap() {
        state.doc_mut().remove(node);
    }
}

fn alert(state: &mut PageState, form_css: &str, message: &str) {
    remove_all(state, ".MuiAlert-root");
    if let Some(form) = first(state, form_css) {
        let _ = state.doc_mut().append(
            form,
            El::new("div")
                .attr("class", "MuiAlert-root")
                .attr("role", "alert")
                .child(El::new("div").attr("class", "MuiAlert-message").text(message)),
        );
    }
}

// -----------------------------------------------------------------------------
// Markup
// -----------------------------------------------------------------------------

fn header(state: &PageState) -> El {
    let (title, icon) = if is_dark(state) {
        ("Switch to light mode", "Brightness7Icon")
    } else {
        ("Switch to dark mode", "Brightness4Icon")
    };
    El::new("header").attr("class", "MuiAppBar-root").children(vec![
        El::new("h6").text("My Blog"),
        El::new("button")
            .attr("type", "button")
            .attr("class", "MuiIconButton-root MuiIconButton-colorInherit")
            .attr("title", title)
            .child(El::new("svg").attr("data-testid", icon)),
    ])
}

fn shell(state: &mut PageState, main: Vec<El>) {
    let top = header(state);
    state.render(vec![top, El::new("main").children(main)]);
}

fn loading() -> El {
    El::new("p").attr("class", "loading").text("Loading...")
}

fn card(blog: &SeedBlog, read: bool) -> El {
    let mut content = El::new("div").attr("class", "MuiCardContent-root").children(vec![
        El::new("h2").text(&blog.title),
        El::new("p").text(&blog.excerpt),
    ]);
    if read {
        content = content.child(
            El::new("div")
                .attr("class", "MuiChip-root")
                .child(El::new("span").attr("class", "MuiChip-label").text("Read")),
        );
    }
    El::new("div")
        .attr("class", "MuiPaper-root MuiCard-root")
        .children(vec![
            content,
            El::new("div").attr("class", "MuiCardActions-root").child(
                El::new("button")
                    .attr("type", "button")
                    .attr("class", "read-more")
                    .attr("data-id", blog.id.to_string())
                    .text("Read More"),
            ),
        ])
}

fn page_button(label: &str, target: usize, disabled: bool, class: &str) -> El {
    let button = El::new("button")
        .attr("type", "button")
        .attr("class", format!("MuiPaginationItem-root {class}"))
        .attr("aria-label", label)
        .attr("data-page", target.to_string());
    if disabled {
        button.flag("disabled")
    } else {
        button
    }
}

fn pagination(current: usize, pages: usize) -> El {
    let mut items = vec![El::new("li").child(page_button(
        "Go to previous page",
        current.saturating_sub(1).max(1),
        current <= 1,
        "MuiPaginationItem-previousNext",
    ))];
    for n in 1..=pages {
        let mut button = page_button(
            &format!("page {n}"),
            n,
            false,
            "MuiPaginationItem-circular",
        )
        .text(n.to_string());
        if n == current {
            button = button.attr("aria-current", "true");
        }
        items.push(El::new("li").child(button));
    }
    items.push(El::new("li").child(page_button(
        "Go to next page",
        (current + 1).min(pages),
        current >= pages,
        "MuiPaginationItem-previousNext",
    )));
    El::new("nav")
        .attr("aria-label", "pagination navigation")
        .child(El::new("ul").attr("class", "MuiPagination-ul").children(items))
}

fn comment_items(comments: &[SeedComment]) -> Vec<El> {
    comments
        .iter()
        .rev()
        .map(|c| {
            El::new("li").children(vec![
                El::new("h6")
                    .attr("class", "MuiTypography-root MuiTypography-subtitle2")
                    .text(&c.author),
                El::new("p").text(&c.content),
            ])
        })
        .collect()
}

fn admin_row(blog: &SeedBlog) -> El {
    let action = |title: &str, icon: &str| {
        El::new("button")
            .attr("type", "button")
            .attr("title", title)
            .attr("data-id", blog.id.to_string())
            .child(El::new("svg").attr("data-testid", icon))
    };
    El::new("tr").attr("class", "MuiTableRow-root").children(vec![
        El::new("td").text(&blog.title),
        El::new("td").text(&blog.category),
        El::new("td").children(vec![
            action("View", "VisibilityIcon"),
            action("Edit", "EditIcon"),
            action("Delete", "DeleteIcon"),
        ]),
    ])
}

// -----------------------------------------------------------------------------
// Routes
// -----------------------------------------------------------------------------

fn render_home(state: &mut PageState, store: &FakeStore) {
    let current: usize = state
        .query_param("page")
        .and_then(|p| p.parse().ok())
        .filter(|p| *p >= 1)
        .unwrap_or(1);
    let search = state
        .query_param("search")
        .unwrap_or_default()
        .replace('+', " ")
        .to_lowercase();
    shell(state, vec![loading()]);

    let blogs: Vec<SeedBlog> = store.with(|d| {
        d.blogs
            .iter()
            .filter(|b| b.published && b.title.to_lowercase().contains(&search))
            .cloned()
            .collect()
    });
    let body = json!(blogs
        .iter()
        .map(|b| json!({"id": b.id, "title": b.title}))
        .collect::<Vec<_>>());
    state.fetch("GET", &api("/api/blogs"), 200, Some(body), LATENCY, move |state| {
        let read = read_ids(state);
        let pages = blogs.len().div_ceil(PER_PAGE).max(1);
        let cards: Vec<El> = blogs
            .iter()
            .skip((current - 1) * PER_PAGE)
            .take(PER_PAGE)
            .map(|b| card(b, read.contains(&b.id)))
            .collect();
        shell(
            state,
            vec![
                El::new("form").attr("class", "search").child(
                    El::new("input")
                        .attr("type", "search")
                        .attr("placeholder", "Search blogs..."),
                ),
                El::new("div").attr("class", "MuiGrid-container").children(cards),
                pagination(current, pages),
            ],
        );
    });
}

fn render_details(state: &mut PageState, store: &FakeStore) {
    let id: Option<u64> = state.path().trim_start_matches("/blog/").parse().ok();
    let blog = id.and_then(|id| {
        store.with(|d| {
            let blog = d.blog_mut(id)?;
            blog.views += 1;
            Some(blog.clone())
        })
    });
    let Some(blog) = blog else {
        shell(state, vec![El::new("h4").text("Blog not found")]);
        return;
    };
    let mut read = read_ids(state);
    if !read.contains(&blog.id) {
        read.push(blog.id);
        state.set_storage(READ_BLOGS_KEY, serde_json::to_string(&read).unwrap());
    }
    shell(state, vec![loading()]);

    let comments: Vec<SeedComment> = store.with(|d| {
        d.comments
            .iter()
            .filter(|c| c.blog_id == blog.id)
            .cloned()
            .collect()
    });
    let body = json!({"id": blog.id, "title": blog.title, "views": blog.views});
    let url = api(&format!("/api/blogs/public/{}", blog.id));
    state.fetch("GET", &url, 200, Some(body), LATENCY, move |state| {
        shell(
            state,
            vec![El::new("article").children(vec![
                El::new("div").children(vec![
                    El::new("h2").text(&blog.title),
                    El::new("p").text(&blog.content),
                ]),
                El::new("div").attr("class", "likes").children(vec![
                    El::new("button")
                        .attr("type", "button")
                        .attr("id", "like")
                        .attr("data-id", blog.id.to_string())
                        .child(El::new("svg").attr("data-testid", "ThumbUpIcon")),
                    El::new("span")
                        .attr("class", "like-count")
                        .text(format!("{} likes", blog.likes)),
                ]),
                El::new("h5").text("Comments"),
                El::new("ul")
                    .attr("class", "comments")
                    .children(comment_items(&comments)),
                El::new("form")
                    .attr("class", "comment-form")
                    .attr("data-id", blog.id.to_string())
                    .children(vec![
                        El::new("input")
                            .attr("type", "text")
                            .attr("placeholder", "Your name")
                            .flag("required"),
                        El::new("textarea")
                            .attr("placeholder", "Write a comment")
                            .flag("required"),
                        El::new("button").attr("type", "submit").text("Post Comment"),
                    ]),
            ])],
        );
    });
}

fn render_login(state: &mut PageState) {
    shell(
        state,
        vec![El::new("div").attr("class", "MuiPaper-root").children(vec![
            El::new("div").attr("role", "tablist").children(vec![
                El::new("button")
                    .attr("type", "button")
                    .attr("role", "tab")
                    .attr("aria-selected", "true")
                    .text("Login"),
                El::new("button")
                    .attr("type", "button")
                    .attr("role", "tab")
                    .attr("aria-selected", "false")
                    .text("Register"),
            ]),
            El::new("form")
                .attr("class", "auth-form")
                .attr("data-mode", "login")
                .children(vec![
                    El::new("input").attr("type", "text").attr("name", "username"),
                    El::new("input").attr("type", "password").attr("name", "password"),
                    El::new("button").attr("type", "submit").text("Login"),
                ]),
        ])],
    );
}

fn render_admin(state: &mut PageState, store: &FakeStore) {
    if state.storage("token").is_none() {
        state.navigate("/login");
        return;
    }
    shell(
        state,
        vec![
            El::new("h4").text("Dashboard"),
            El::new("button")
                .attr("type", "button")
                .attr("class", "MuiButton-root MuiButton-containedPrimary new-post")
                .text("New Blog Post"),
            El::new("table").attr("class", "MuiTable-root").children(vec![
                El::new("thead").child(El::new("tr").children(vec![
                    El::new("th").text("Title"),
                    El::new("th").text("Category"),
                    El::new("th").text("Actions"),
                ])),
                El::new("tbody").attr("class", "MuiTableBody-root"),
            ]),
        ],
    );
    let blogs = store.with(|d| d.blogs.clone());
    let body = json!(blogs.iter().map(|b| json!({"id": b.id})).collect::<Vec<_>>());
    state.fetch("GET", &api("/api/blogs"), 200, Some(body), LATENCY, move |state| {
        if let Some(tbody) = first(state, ".MuiTableBody-root") {
            for blog in &blogs {
                let _ = state.doc_mut().append(tbody, admin_row(blog));
            }
        }
    });
}

fn render_editor(state: &mut PageState) {
    if state.storage("token").is_none() {
        state.navigate("/login");
        return;
    }
    shell(
        state,
        vec![
            El::new("h4").text("Create New Blog Post"),
            El::new("form").attr("class", "editor").children(vec![
                El::new("div")
                    .attr("class", "MuiInputBase-root")
                    .child(El::new("input").attr("type", "text").attr("name", "title")),
                El::new("div").attr("class", "ql-container").child(
                    El::new("div")
                        .attr("class", "ql-editor")
                        .attr("contenteditable", "true"),
                ),
                El::new("div")
                    .attr("class", "MuiInputBase-root")
                    .child(El::new("textarea").attr("name", "excerpt")),
                El::new("div")
                    .attr("class", "MuiSelect-select")
                    .attr("role", "combobox")
                    .attr("aria-label", "Category")
                    .attr("tabindex", "0"),
                El::new("button").attr("type", "button").text("Save"),
                El::new("button")
                    .attr("type", "button")
                    .attr("class", "publish")
                    .text("Publish Now"),
            ]),
        ],
    );
}

// -----------------------------------------------------------------------------
// Behaviour
// -----------------------------------------------------------------------------

fn install(vp: &VirtualPage, store: &FakeStore) {
    let s = store.clone();
    vp.route("/", move |state| render_home(state, &s)).unwrap();
    let s = store.clone();
    vp.route("/blog/", move |state| render_details(state, &s)).unwrap();
    vp.route("/login", render_login).unwrap();
    let s = store.clone();
    vp.route("/admin", move |state| render_admin(state, &s)).unwrap();
    vp.route("/admin/blog/new", render_editor).unwrap();

    vp.on("click", ".MuiIconButton-colorInherit", |state, ctx| {
        let dark = !is_dark(state);
        state.set_storage(THEME_KEY, if dark { "dark" } else { "light" });
        let title = if dark {
            "Switch to light mode"
        } else {
            "Switch to dark mode"
        };
        state.doc_mut().set_attr(ctx.current, "title", title);
    })
    .unwrap();

    vp.on("click", "button.read-more", |state, ctx| {
        let id = id_from(state, ctx);
        state.navigate(&format!("/blog/{id}"));
    })
    .unwrap();

    vp.on("click", "[data-page]", |state, ctx| {
        if let Some(page) = attr_of(state, ctx.current, "data-page") {
            state.navigate(&format!("/?page={page}"));
        }
    })
    .unwrap();

    vp.on("submit", "form.search", |state, _| {
        let keyword = value_of(state, "form.search input");
        state.navigate(&format!("/?search={}", keyword.trim().replace(' ', "+")));
    })
    .unwrap();

    let s = store.clone();
    vp.on("click", "#like", move |state, ctx| {
        let id = id_from(state, ctx);
        state.doc_mut().set_attr(ctx.current, "disabled", "");
        let likes = s.with(|d| {
            d.blog_mut(id).map_or(0, |b| {
                b.likes += 1;
                b.likes
            })
        });
        let url = api(&format!("/api/blogs/{id}/like"));
        state.fetch("POST", &url, 200, Some(json!({"likes": likes})), LATENCY, move |state| {
            if let Some(span) = first(state, "span.like-count") {
                state.doc_mut().set_text(span, format!("{likes} likes"));
            }
        });
    })
    .unwrap();

    let s = store.clone();
    vp.on("submit", "form.comment-form", move |state, ctx| {
        let blog_id = id_from(state, ctx);
        let author = value_of(state, "form.comment-form input");
        let content = value_of(state, "form.comment-form textarea");
        if author.trim().is_empty() || content.trim().is_empty() {
            return;
        }
        s.with(|d| {
            d.comments.push(SeedComment {
                blog_id,
                author: author.clone(),
                content: content.clone(),
            });
        });
        let comments: Vec<SeedComment> = s.with(|d| {
            d.comments
                .iter()
                .filter(|c| c.blog_id == blog_id)
                .cloned()
                .collect()
        });
        let body = json!({"blogId": blog_id, "authorName": author, "content": content});
        state.fetch("POST", &api("/api/comments"), 201, Some(body), LATENCY, move |state| {
            if let Some(list) = first(state, "ul.comments") {
                state.doc_mut().clear_children(list);
                for item in comment_items(&comments) {
                    let _ = state.doc_mut().append(list, item);
                }
            }
            for field in ["form.comment-form input", "form.comment-form textarea"] {
                if let Some(node) = first(state, field) {
                    state.doc_mut().set_value(node, "");
                }
            }
        });
    })
    .unwrap();

    vp.on("click", "[role=\"tab\"]", |state, ctx| {
        let mode = state.doc().text_content(ctx.current).trim().to_lowercase();
        for tab in state.doc().query_css("[role=\"tab\"]").unwrap() {
            state.doc_mut().set_attr(tab, "aria-selected", "false");
        }
        state.doc_mut().set_attr(ctx.current, "aria-selected", "true");
        if let Some(form) = first(state, "form.auth-form") {
            state.doc_mut().set_attr(form, "data-mode", mode.clone());
        }
        if let Some(submit) = first(state, "form.auth-form button") {
            let label = if mode == "register" { "Register" } else { "Login" };
            state.doc_mut().set_text(submit, label);
        }
        remove_all(state, ".MuiAlert-root");
    })
    .unwrap();

    let s = store.clone();
    vp.on("submit", "form.auth-form", move |state, ctx| {
        let mode = attr_of(state, ctx.current, "data-mode").unwrap_or_default();
        let username = value_of(state, "form.auth-form input[type=\"text\"]");
        let password = value_of(state, "form.auth-form input[type=\"password\"]");
        if mode == "register" {
            let taken = s.with(|d| d.users.iter().any(|u| u.username == username));
            let (status, body) = if taken {
                (409, json!({"error": "Username already exists"}))
            } else {
                s.with(|d| {
                    d.users.push(SeedUser {
                        username: username.clone(),
                        password: password.clone(),
                        role: "user".into(),
                    });
                });
                (201, json!({"message": "Registration successful"}))
            };
            let url = api("/api/auth/register");
            state.fetch("POST", &url, status, Some(body.clone()), LATENCY, move |state| {
                let message = body
                    .get("error")
                    .or_else(|| body.get("message"))
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                alert(state, "form.auth-form", &message);
            });
            return;
        }
        let valid = s.with(|d| {
            d.users
                .iter()
                .any(|u| u.username == username && u.password == password)
        });
        let url = api("/api/auth/login");
        if valid {
            let body = json!({"token": TOKEN, "user": {"username": username}});
            state.fetch("POST", &url, 200, Some(body), LATENCY, |state| {
                state.set_storage("token", TOKEN);
                state.navigate("/admin");
            });
        } else {
            let body = json!({"error": "Invalid credentials"});
            state.fetch("POST", &url, 401, Some(body), LATENCY, |state| {
                alert(state, "form.auth-form", "Invalid credentials");
            });
        }
    })
    .unwrap();

    vp.on("click", "button.new-post", |state, _| {
        state.navigate("/admin/blog/new");
    })
    .unwrap();

    let s = store.clone();
    vp.on("click", "button[title=\"Delete\"]", move |state, ctx| {
        let id = id_from(state, ctx);
        let title = s.with(|d| d.blog(id).map(|b| b.title.clone()).unwrap_or_default());
        let root = state.doc().root();
        let _ = state.doc_mut().append(
            root,
            El::new("div")
                .attr("class", "MuiDialog-root")
                .attr("role", "dialog")
                .children(vec![
                    El::new("h2").text("Delete Blog Post"),
                    El::new("p").text(format!("Are you sure you want to delete \"{title}\"?")),
                    El::new("div").children(vec![
                        El::new("button")
                            .attr("type", "button")
                            .attr("class", "MuiButton-root MuiButton-textPrimary")
                            .text("Cancel"),
                        El::new("button")
                            .attr("type", "button")
                            .attr("class", "MuiButton-root MuiButton-containedError")
                            .attr("data-id", id.to_string())
                            .text("Delete"),
                    ]),
                ]),
        );
    })
    .unwrap();

    vp.on("click", ".MuiButton-textPrimary", |state, _| {
        remove_all(state, "[role=\"dialog\"]");
    })
    .unwrap();

    let s = store.clone();
    vp.on("click", ".MuiButton-containedError", move |state, ctx| {
        let id = id_from(state, ctx);
        remove_all(state, "[role=\"dialog\"]");
        s.with(|d| {
            d.blogs.retain(|b| b.id != id);
            d.comments.retain(|c| c.blog_id != id);
        });
        let url = api(&format!("/api/blogs/{id}"));
        let body = json!({"message": "Blog deleted successfully"});
        state.fetch("DELETE", &url, 200, Some(body), LATENCY, |state| {
            state.navigate("/admin");
        });
    })
    .unwrap();

    vp.on("click", "[role=\"combobox\"]", |state, _| {
        if first(state, "[role=\"listbox\"]").is_some() {
            return;
        }
        let root = state.doc().root();
        let options = CATEGORIES.iter().map(|c| {
            El::new("li")
                .attr("role", "option")
                .attr("data-value", *c)
                .text(*c)
        });
        let _ = state.doc_mut().append(
            root,
            El::new("ul").attr("role", "listbox").children(options),
        );
    })
    .unwrap();

    vp.on("click", "[role=\"option\"]", |state, ctx| {
        let value = attr_of(state, ctx.current, "data-value").unwrap_or_default();
        if let Some(select) = first(state, "[role=\"combobox\"]") {
            state.doc_mut().set_text(select, value);
        }
        remove_all(state, "[role=\"listbox\"]");
    })
    .unwrap();

    let s = store.clone();
    vp.on("click", "button.publish", move |state, _| {
        let title = value_of(state, "form.editor input");
        let content = value_of(state, ".ql-editor");
        let excerpt = value_of(state, "form.editor textarea");
        let category = first(state, "[role=\"combobox\"]")
            .map(|n| state.doc().text_content(n).trim().to_string())
            .unwrap_or_default();
        let url = api("/api/blogs");
        if [&title, &content, &excerpt, &category]
            .iter()
            .any(|v| v.trim().is_empty())
        {
            let body = json!({"error": "All fields are required"});
            state.fetch("POST", &url, 400, Some(body), LATENCY, |state| {
                alert(state, "form.editor", "All fields are required");
            });
            return;
        }
        let blog = s.with(|d| {
            let id = d.blogs.iter().map(|b| b.id).max().unwrap_or(0) + 1;
            let blog = SeedBlog {
                id,
                title,
                content,
                excerpt,
                category,
                likes: 0,
                views: 0,
                published: true,
            };
            d.blogs.push(blog.clone());
            blog
        });
        let body = json!({"id": blog.id, "title": blog.title});
        state.fetch("POST", &url, 201, Some(body), LATENCY, |state| {
            state.navigate("/admin");
        });
    })
    .unwrap();
}
