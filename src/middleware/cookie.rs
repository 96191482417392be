use axum::http::{header, HeaderMap};

/// Cookie carrying the plaintext remember token.
pub const REMEMBER_COOKIE: &str = "remember_token";

/// Value of the first cookie called `name` across all `Cookie` headers.
pub fn read(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.trim_matches('"').to_string())
        .filter(|v| !v.is_empty())
}

/// `Set-Cookie` value handing `token` to the browser.
pub fn remember(token: &str, secure: bool) -> String {
    let mut cookie = format!("{REMEMBER_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax");
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value that drops the remember cookie.
pub fn clear(secure: bool) -> String {
    let mut cookie = format!("{REMEMBER_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}
