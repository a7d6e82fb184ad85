use serde::Deserialize;

/// Media type of a Threads container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Text,
    Image,
    Carousel,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Text => "TEXT",
            MediaType::Image => "IMAGE",
            MediaType::Carousel => "CAROUSEL",
        }
    }
}

/// Parameters for `POST /{user_id}/threads`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRequest {
    pub media_type: MediaType,
    pub text: Option<String>,
    pub image_url: Option<String>,
    pub is_carousel_item: bool,
    pub children: Vec<String>,
}

impl ContainerRequest {
    /// Text-only post.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            media_type: MediaType::Text,
            text: Some(text.into()),
            image_url: None,
            is_carousel_item: false,
            children: Vec::new(),
        }
    }

    /// Single image post with caption.
    pub fn image(image_url: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            media_type: MediaType::Image,
            text: Some(text.into()),
            image_url: Some(image_url.into()),
            is_carousel_item: false,
            children: Vec::new(),
        }
    }

    /// Image staged as a carousel child. Carousel items carry no text.
    pub fn carousel_item(image_url: impl Into<String>) -> Self {
        Self {
            media_type: MediaType::Image,
            text: None,
            image_url: Some(image_url.into()),
            is_carousel_item: true,
            children: Vec::new(),
        }
    }

    /// Carousel referencing previously created item containers.
    pub fn carousel(children: Vec<String>, text: impl Into<String>) -> Self {
        Self {
            media_type: MediaType::Carousel,
            text: Some(text.into()),
            image_url: None,
            is_carousel_item: false,
            children,
        }
    }

    /// Form fields, without the access token.
    pub(crate) fn form_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![("media_type", self.media_type.as_str().to_string())];
        if let Some(text) = &self.text {
            fields.push(("text", text.clone()));
        }
        if let Some(image_url) = &self.image_url {
            fields.push(("image_url", image_url.clone()));
        }
        if self.is_carousel_item {
            fields.push(("is_carousel_item", "true".to_string()));
        }
        if !self.children.is_empty() {
            fields.push(("children", self.children.join(",")));
        }
        fields
    }
}

/// Server-side processing state of a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerStatus {
    Finished,
    Published,
    InProgress,
    Error(Option<String>),
    Expired,
    Other(String),
}

impl ContainerStatus {
    pub fn from_parts(status: &str, error_message: Option<String>) -> Self {
        match status.to_ascii_uppercase().as_str() {
            "FINISHED" => ContainerStatus::Finished,
            "PUBLISHED" => ContainerStatus::Published,
            "IN_PROGRESS" => ContainerStatus::InProgress,
            "ERROR" => ContainerStatus::Error(error_message),
            "EXPIRED" => ContainerStatus::Expired,
            other => ContainerStatus::Other(other.to_string()),
        }
    }

    /// Safe to reference from a carousel or publish.
    pub fn is_ready(&self) -> bool {
        matches!(self, ContainerStatus::Finished | ContainerStatus::Published)
    }

    /// Will never become ready.
    pub fn is_terminal_failure(&self) -> bool {
        matches!(self, ContainerStatus::Error(_) | ContainerStatus::Expired)
    }
}

/// `{"id": "..."}` responses.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct IdResponse {
    #[serde(default)]
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct StatusResponse {
    pub status: String,
    pub error_message: Option<String>,
}

/// Long-lived token returned by exchange and refresh endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct LongLivedToken {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    /// Seconds until expiry.
    pub expires_in: i64,
}

/// Short-lived token returned by the authorization code exchange.
#[derive(Debug, Clone, Deserialize)]
pub struct ShortLivedToken {
    pub access_token: String,
    #[serde(default, deserialize_with = "id_as_string")]
    pub user_id: Option<String>,
}

/// The Graph API returns `user_id` as a number on some endpoints.
fn id_as_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert!(ContainerStatus::from_parts("FINISHED", None).is_ready());
        assert!(ContainerStatus::from_parts("published", None).is_ready());
        assert!(ContainerStatus::from_parts("ERROR", Some("bad".into())).is_terminal_failure());
        assert!(ContainerStatus::from_parts("EXPIRED", None).is_terminal_failure());

        let pending = ContainerStatus::from_parts("IN_PROGRESS", None);
        assert!(!pending.is_ready());
        assert!(!pending.is_terminal_failure());
    }

    #[test]
    fn carousel_form_joins_children() {
        let request = ContainerRequest::carousel(vec!["1".into(), "2".into()], "hello");
        let fields = request.form_fields();
        assert!(fields.contains(&("media_type", "CAROUSEL".to_string())));
        assert!(fields.contains(&("children", "1,2".to_string())));
        assert!(!fields.iter().any(|(k, _)| *k == "is_carousel_item"));
    }

    #[test]
    fn short_lived_token_accepts_numeric_user_id() {
        let token: ShortLivedToken =
            serde_json::from_str(r#"{"access_token":"abc","user_id":12345}"#).unwrap();
        assert_eq!(token.user_id.as_deref(), Some("12345"));
    }
}
