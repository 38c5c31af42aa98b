//! Form-url-encoded login bodies

use axum::http::{header, HeaderMap};

/// Content type of HTML form submissions
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Check whether a request declares a form-url-encoded body
pub fn is_form_encoded(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase().contains(FORM_CONTENT_TYPE))
        .unwrap_or(false)
}

/// An ordered list of form fields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginForm {
    fields: Vec<(String, String)>,
}

impl LoginForm {
    /// Parse a form-url-encoded body; `None` if it is not valid
    pub fn parse(body: &[u8]) -> Option<Self> {
        serde_urlencoded::from_bytes::<Vec<(String, String)>>(body)
            .ok()
            .map(|fields| Self { fields })
    }

    /// A form holding only a username and password
    pub fn credentials(
        username_field: &str,
        username: &str,
        password_field: &str,
        password: &str,
    ) -> Self {
        let mut form = Self::default();
        form.set(username_field, username);
        form.set(password_field, password);
        form
    }

    /// First value of a field
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Set a field, replacing the first occurrence and dropping any repeats
    pub fn set(&mut self, name: &str, value: &str) {
        let mut seen = false;
        self.fields.retain_mut(|(k, v)| {
            if k != name {
                return true;
            }
            if seen {
                return false;
            }
            seen = true;
            *v = value.to_string();
            true
        });
        if !seen {
            self.fields.push((name.to_string(), value.to_string()));
        }
    }

    /// Encode the form as a request body
    pub fn encode(&self) -> Result<String, serde_urlencoded::ser::Error> {
        serde_urlencoded::to_string(&self.fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_content_type_detection() {
        let mut headers = HeaderMap::new();
        assert!(!is_form_encoded(&headers));

        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded; charset=UTF-8"),
        );
        assert!(is_form_encoded(&headers));

        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("multipart/form-data"));
        assert!(!is_form_encoded(&headers));
    }

    #[test]
    fn test_set_preserves_other_fields() {
        let mut form = LoginForm::parse(b"csrf=abc&user=me&pass=tok&remember=on").unwrap();
        form.set("user", "staff");
        form.set("pass", "s3cret&more");
        assert_eq!(
            form.encode().unwrap(),
            "csrf=abc&user=staff&pass=s3cret%26more&remember=on"
        );
    }

    #[test]
    fn test_set_collapses_repeats_and_appends() {
        let mut form = LoginForm::parse(b"pass=a&pass=b").unwrap();
        form.set("pass", "c");
        form.set("user", "staff");
        assert_eq!(form.encode().unwrap(), "pass=c&user=staff");
    }

    #[test]
    fn test_get_decodes_values() {
        let form = LoginForm::parse(b"user=a%40b.com&pass=x+y").unwrap();
        assert_eq!(form.get("user"), Some("a@b.com"));
        assert_eq!(form.get("pass"), Some("x y"));
        assert_eq!(form.get("missing"), None);
    }

    #[test]
    fn test_credentials_form() {
        let form = LoginForm::credentials("login", "staff", "secret", "pw");
        assert_eq!(form.encode().unwrap(), "login=staff&secret=pw");
    }
}
