//! Login page autofill injection

use super::token::PasswordToken;
use crate::ApplicationConfig;

const CLOSING_BODY: &[u8] = b"</body>";

/// Insert the autofill script before the first `</body>` of `page`
///
/// The script fills the configured username field with `username` and the
/// password field with the placeholder token, then submits the enclosing
/// form. Pages without a closing body tag get the script appended. The page
/// is handled as raw bytes so its original encoding is left untouched.
pub fn inject_autofill(
    page: &[u8],
    app: &ApplicationConfig,
    username: &str,
    token: &PasswordToken,
) -> Vec<u8> {
    let script = autofill_script(app, username, token);
    let mut out = Vec::with_capacity(page.len() + script.len());

    match find_closing_body(page) {
        Some(at) => {
            out.extend_from_slice(&page[..at]);
            out.extend_from_slice(script.as_bytes());
            out.extend_from_slice(&page[at..]);
        }
        None => {
            out.extend_from_slice(page);
            out.extend_from_slice(script.as_bytes());
        }
    }

    out
}

fn find_closing_body(page: &[u8]) -> Option<usize> {
    page.windows(CLOSING_BODY.len())
        .position(|w| w.eq_ignore_ascii_case(CLOSING_BODY))
}

fn autofill_script(app: &ApplicationConfig, username: &str, token: &PasswordToken) -> String {
    format!(
        r#"<script>
window.addEventListener('DOMContentLoaded', function () {{
  var user = document.getElementsByName({user_field})[0];
  var pass = document.getElementsByName({pass_field})[0];
  if (!user || !pass) {{ return; }}
  user.value = {username};
  pass.value = {token};
  if (pass.form) {{ pass.form.submit(); }}
}});
</script>"#,
        user_field = js_string(&app.username_field),
        pass_field = js_string(&app.password_field),
        username = js_string(username),
        token = js_string(token.as_str()),
    )
}

/// Quote a value as a JavaScript string literal safe inside a `<script>` block
fn js_string(value: &str) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|_| String::from("\"\""))
        .replace("</", "<\\/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn app() -> ApplicationConfig {
        ApplicationConfig::new("wiki.example.com", "/login", "login_user", "login_pass", "WikiSession")
            .with_auto_login(false)
    }

    fn token() -> PasswordToken {
        PasswordToken::derive("alice@example.com", NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
    }

    #[test]
    fn test_injects_before_closing_body() {
        let page = b"<html><body><form></form></body></html>";
        let out = String::from_utf8(inject_autofill(page, &app(), "staff", &token())).unwrap();

        let script_at = out.find("<script>").unwrap();
        let body_at = out.find("</body>").unwrap();
        assert!(script_at < body_at);
        assert!(out.starts_with("<html><body><form></form>"));
        assert!(out.ends_with("</script></body></html>"));
        assert!(out.contains(r#"getElementsByName("login_user")"#));
        assert!(out.contains(r#"getElementsByName("login_pass")"#));
        assert!(out.contains(r#"user.value = "staff";"#));
        assert!(out.contains(&format!(r#"pass.value = "{}";"#, token())));
    }

    #[test]
    fn test_closing_tag_is_case_insensitive() {
        let page = b"<HTML><BODY>x</BODY></HTML>";
        let out = String::from_utf8(inject_autofill(page, &app(), "staff", &token())).unwrap();
        assert!(out.ends_with("</script></BODY></HTML>"));
    }

    #[test]
    fn test_only_first_closing_body_is_used() {
        let page = b"<body>a</body><body>b</body>";
        let out = String::from_utf8(inject_autofill(page, &app(), "staff", &token())).unwrap();
        assert_eq!(out.matches("<script>").count(), 1);
        assert!(out.ends_with("</script></body><body>b</body>"));
    }

    #[test]
    fn test_appends_without_body_tag() {
        let page = b"<form></form>";
        let out = String::from_utf8(inject_autofill(page, &app(), "staff", &token())).unwrap();
        assert!(out.starts_with("<form></form><script>"));
    }

    #[test]
    fn test_values_are_escaped() {
        let page = b"<body></body>";
        let out = String::from_utf8(inject_autofill(
            page,
            &app(),
            "x\"</script><script>alert(1)//",
            &token(),
        ))
        .unwrap();
        assert!(!out.contains("</script><script>alert"));
        assert!(out.contains(r#"\"<\/script>"#));
    }

    #[test]
    fn test_preserves_non_utf8_bytes() {
        let page = b"<body>caf\xe9</body>";
        let out = inject_autofill(page, &app(), "staff", &token());
        assert!(out.starts_with(b"<body>caf\xe9<script>"));
    }
}
