use axum::{
    handler::Handler,
    routing::{delete, get, post, put, MethodRouter},
    Router,
};



pub fn main_router<STATE>(components: Vec<(String, Router<STATE>)>, state: STATE) -> Router
where
    STATE: Clone + Send + Sync + 'static
{
    let mut app = Router::<STATE>::new();

    for (_, router) in components {
        app = app.merge(router);
    }

    app.with_state(state)
}



pub fn method_router_builder<S>(path: &str, method_router: MethodRouter<S>) -> (String, Router<S>)
where
    S: Clone + Send + Sync + 'static,
{
    (path.to_string(), Router::<S>::new().route(path, method_router))
}


pub fn get_router_builder<T, S>(
    path: &str,
    handler: impl Handler<T, S>  + Clone + Send + 'static
) -> (String, Router<S>)
where
    T: 'static,
    S: Clone + Send + Sync + 'static,
{
    method_router_builder(path, get(handler))
}


pub fn post_router_builder<T, S>(
    path: &str,
    handler: impl Handler<T, S>  + Clone + Send + 'static
) -> (String, Router<S>)
where
    T: 'static,
    S: Clone + Send + Sync + 'static,
{
    method_router_builder(path, post(handler))
}


pub fn put_router_builder<T, S>(
    path: &str,
    handler: impl Handler<T, S>  + Clone + Send + 'static
) -> (String, Router<S>)
where
    T: 'static,
    S: Clone + Send + Sync + 'static,
{
    method_router_builder(path, put(handler))
}


pub fn delete_router_builder<T, S>(
    path: &str,
    handler: impl Handler<T, S>  + Clone + Send + 'static
) -> (String, Router<S>)
where
    T: 'static,
    S: Clone + Send + Sync + 'static,
{
    method_router_builder(path, delete(handler))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    async fn hello_handler() -> String {
        "Hello, World!".to_string()
    }

    async fn bye_handler() -> String {
        "Bye".to_string()
    }

    #[tokio::test]
    async fn test_get_router_builder() {

        let (path, router) = get_router_builder::<_ ,_>(
            "/hello",
            hello_handler
        );
        assert_eq!(path, "/hello");
        let app = Router::new().merge(router);

        let request = Request::builder()
            .uri("/hello")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_same_path_different_methods_merge() {
        let components = vec![
            get_router_builder("/thing", hello_handler),
            delete_router_builder("/thing", bye_handler),
        ];
        let app = main_router(components, ());

        let request = Request::builder()
            .method("DELETE")
            .uri("/thing")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let request = Request::builder()
            .method("PUT")
            .uri("/thing")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

}
