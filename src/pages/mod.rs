use askama::Template;
use axum::response::Html;

use crate::error::AppError;

const SITE_NAME: &str = "Greensleeves";

pub fn routes<S>() -> axum::Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    axum::Router::new()
        .route("/", axum::routing::get(index))
        .route("/register", axum::routing::get(register))
        .route("/signin", axum::routing::get(signin))
        .route("/contact", axum::routing::get(contact))
}

/// Shared navigation context for every page
struct Nav {
    site: &'static str,
    path: &'static str,
}

impl Nav {
    fn at(path: &'static str) -> Self {
        Self {
            site: SITE_NAME,
            path,
        }
    }

    fn is_active(&self, path: &str) -> bool {
        self.path == path
    }
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexPage {
    nav: Nav,
    artwork_url: String,
}

#[derive(Template)]
#[template(path = "register.html")]
struct RegisterPage {
    nav: Nav,
}

#[derive(Template)]
#[template(path = "signin.html")]
struct SigninPage {
    nav: Nav,
}

#[derive(Template)]
#[template(path = "contact.html")]
struct ContactPage {
    nav: Nav,
}

fn render<T: Template>(page: T) -> Result<Html<String>, AppError> {
    Ok(Html(page.render()?))
}

async fn index() -> Result<Html<String>, AppError> {
    render(IndexPage {
        nav: Nav::at("/"),
        artwork_url: format!("/static{}", crate::artwork::PROXY_PATH),
    })
}

async fn register() -> Result<Html<String>, AppError> {
    render(RegisterPage {
        nav: Nav::at("/register"),
    })
}

async fn signin() -> Result<Html<String>, AppError> {
    render(SigninPage {
        nav: Nav::at("/signin"),
    })
}

async fn contact() -> Result<Html<String>, AppError> {
    render(ContactPage {
        nav: Nav::at("/contact"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header::CONTENT_TYPE, Method, Request, StatusCode},
        Router,
    };
    use tower::ServiceExt;

    fn setup_test_app() -> Router {
        routes()
    }

    async fn fetch_page(uri: &str) -> (StatusCode, String, String) {
        let response = setup_test_app()
            .oneshot(
                Request::builder()
                    .method(Method::GET)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let content_type = response.headers()[CONTENT_TYPE].to_str().unwrap().to_string();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, content_type, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_index_embeds_artwork_proxy() {
        let (status, content_type, body) = fetch_page("/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(content_type.starts_with("text/html"));
        assert!(body.contains("/static/proxy/greensleeves"));
        assert!(body.contains("<title>Greensleeves</title>"));
    }

    #[tokio::test]
    async fn test_form_pages_render() {
        for (uri, marker) in [
            ("/register", "id=\"register-form\""),
            ("/signin", "id=\"signin-form\""),
            ("/contact", "id=\"contact-form\""),
        ] {
            let (status, _, body) = fetch_page(uri).await;
            assert_eq!(status, StatusCode::OK, "{}", uri);
            assert!(body.contains(marker), "{} missing {}", uri, marker);
            assert!(body.contains("class=\"active\""), "{} has no active nav", uri);
        }
    }

    #[test]
    fn test_nav_active_path() {
        let nav = Nav::at("/contact");
        assert!(nav.is_active("/contact"));
        assert!(!nav.is_active("/"));
    }
}
