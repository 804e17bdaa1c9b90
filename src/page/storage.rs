//! Cookies and localStorage.

use serde::{Deserialize, Serialize};

use super::{Page, js};
use crate::cdp::CdpError;

/// A cookie, in the shape `Network.setCookie` accepts and
/// `Network.getCookies` returns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default)]
    pub secure: bool,
    #[serde(rename = "httpOnly", default)]
    pub http_only: bool,
    #[serde(rename = "sameSite", skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<f64>,
}

/// Parse a `name=value` cookie argument.
///
/// # Errors
///
/// Returns `CdpError::InvalidArgument` when the input has no `=` or an
/// empty name.
pub fn parse_cookie_arg(input: &str) -> Result<Cookie, CdpError> {
    let (name, value) = input
        .split_once('=')
        .ok_or_else(|| CdpError::InvalidArgument(format!("cookie must be name=value: {input:?}")))?;
    if name.is_empty() {
        return Err(CdpError::InvalidArgument(format!(
            "cookie name is empty: {input:?}"
        )));
    }
    Ok(Cookie {
        name: name.to_owned(),
        value: value.to_owned(),
        ..Cookie::default()
    })
}

impl Page {
    /// Set a cookie. When the cookie names no domain, it is scoped to the
    /// page's current URL.
    ///
    /// # Errors
    ///
    /// Returns `CdpError::InvalidArgument` when the browser rejects the
    /// cookie, or any command failure.
    pub async fn set_cookie(&mut self, cookie: &Cookie) -> Result<(), CdpError> {
        self.ensure_domain("Network").await?;

        let mut params = serde_json::to_value(cookie)
            .map_err(|e| CdpError::Internal(format!("cookie serialization: {e}")))?;
        if cookie.domain.is_none() {
            let url = self.url().await?;
            params["url"] = serde_json::json!(url);
        }

        let result = self.call("Network.setCookie", Some(params)).await?;
        if result["success"].as_bool() == Some(false) {
            return Err(CdpError::InvalidArgument(format!(
                "browser rejected cookie {:?}",
                cookie.name
            )));
        }
        Ok(())
    }

    /// Cookies visible to the current page.
    ///
    /// # Errors
    ///
    /// Returns `CdpError::Parse` on an unexpected response shape.
    pub async fn get_cookies(&mut self) -> Result<Vec<Cookie>, CdpError> {
        self.ensure_domain("Network").await?;
        let result = self.call("Network.getCookies", None).await?;
        let cookies = result
            .get("cookies")
            .cloned()
            .ok_or_else(|| CdpError::Parse("Network.getCookies missing cookies".into()))?;
        serde_json::from_value(cookies)
            .map_err(|e| CdpError::Parse(format!("cookie list did not match schema: {e}")))
    }

    /// Delete all browser cookies.
    ///
    /// # Errors
    ///
    /// Returns any command failure.
    pub async fn clear_cookies(&mut self) -> Result<(), CdpError> {
        self.ensure_domain("Network").await?;
        self.call("Network.clearBrowserCookies", None).await?;
        Ok(())
    }

    /// Read a localStorage key. `None` when the key is absent.
    ///
    /// # Errors
    ///
    /// Returns any evaluation failure.
    pub async fn get_local_storage(&mut self, key: &str) -> Result<Option<String>, CdpError> {
        let value = self.eval_json(&js::local_storage_get(key)).await?;
        Ok(value.as_str().map(str::to_owned))
    }

    /// Write a localStorage key.
    ///
    /// # Errors
    ///
    /// Returns any evaluation failure (e.g. storage disabled on the page).
    pub async fn set_local_storage(&mut self, key: &str, value: &str) -> Result<(), CdpError> {
        self.eval_json(&js::local_storage_set(key, value)).await?;
        Ok(())
    }

    /// Remove a localStorage key.
    ///
    /// # Errors
    ///
    /// Returns any evaluation failure.
    pub async fn remove_local_storage(&mut self, key: &str) -> Result<(), CdpError> {
        self.eval_json(&js::local_storage_remove(key)).await?;
        Ok(())
    }

    /// Clear localStorage for the page's origin.
    ///
    /// # Errors
    ///
    /// Returns any evaluation failure.
    pub async fn clear_local_storage(&mut self) -> Result<(), CdpError> {
        self.eval_json(&js::local_storage_clear()).await?;
        Ok(())
    }

    /// All localStorage keys for the page's origin.
    ///
    /// # Errors
    ///
    /// Returns any evaluation failure.
    pub async fn local_storage_keys(&mut self) -> Result<Vec<String>, CdpError> {
        let value = self.eval_json(&js::local_storage_keys()).await?;
        Ok(value
            .as_array()
            .map(|keys| {
                keys.iter()
                    .filter_map(|k| k.as_str().map(str::to_owned))
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_cookie() {
        let cookie = parse_cookie_arg("session=abc123").unwrap();
        assert_eq!(cookie.name, "session");
        assert_eq!(cookie.value, "abc123");
        assert!(cookie.domain.is_none());
    }

    #[test]
    fn parse_cookie_value_may_contain_equals() {
        let cookie = parse_cookie_arg("token=a=b=c").unwrap();
        assert_eq!(cookie.value, "a=b=c");
    }

    #[test]
    fn parse_cookie_empty_value_is_fine() {
        let cookie = parse_cookie_arg("flag=").unwrap();
        assert_eq!(cookie.value, "");
    }

    #[test]
    fn parse_cookie_rejects_missing_equals() {
        assert!(matches!(
            parse_cookie_arg("just-a-name"),
            Err(CdpError::InvalidArgument(_))
        ));
    }

    #[test]
    fn parse_cookie_rejects_empty_name() {
        assert!(matches!(
            parse_cookie_arg("=value"),
            Err(CdpError::InvalidArgument(_))
        ));
    }

    #[test]
    fn cookie_serialization_skips_unset_fields() {
        let cookie = Cookie {
            name: "a".into(),
            value: "b".into(),
            ..Cookie::default()
        };
        let json: serde_json::Value = serde_json::to_value(&cookie).unwrap();
        assert!(json.get("domain").is_none());
        assert!(json.get("sameSite").is_none());
        assert_eq!(json["httpOnly"], false);
    }

    #[test]
    fn cookie_deserializes_from_cdp_shape() {
        let json = serde_json::json!({
            "name": "session",
            "value": "xyz",
            "domain": ".example.com",
            "path": "/",
            "secure": true,
            "httpOnly": true,
            "sameSite": "Lax",
            "expires": 1_900_000_000.0,
            "size": 10,
            "session": false
        });
        let cookie: Cookie = serde_json::from_value(json).unwrap();
        assert_eq!(cookie.domain.as_deref(), Some(".example.com"));
        assert!(cookie.http_only);
        assert_eq!(cookie.same_site.as_deref(), Some("Lax"));
    }
}
