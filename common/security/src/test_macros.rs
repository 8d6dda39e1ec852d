//! Shared test helper macro for constructing identity headers quickly.
//! Usage: test_request_headers!(req, roles="customer", user="<uuid>");
#[macro_export]
macro_rules! test_request_headers {
    ($req:expr, roles=$roles:expr, user=$user:expr) => {{
        let h = $req.headers_mut();
        h.insert("X-Roles", ::axum::http::HeaderValue::from_str($roles).unwrap());
        h.insert("X-User-ID", ::axum::http::HeaderValue::from_str($user).unwrap());
    }};
    ($req:expr, user=$user:expr) => {{
        let h = $req.headers_mut();
        h.insert("X-User-ID", ::axum::http::HeaderValue::from_str($user).unwrap());
    }};
}
