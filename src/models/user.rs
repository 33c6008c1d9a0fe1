use serde::{Deserialize, Serialize};

const FALLBACK_DISPLAY_NAME: &str = "User";

/// The signed-in user, as shown in the profile menu.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub display_name: String,
    pub email: String,
}

impl Principal {
    /// Builds the profile, falling back to the email and then to a generic
    /// label when no display name was stored.
    pub fn new(id: impl Into<String>, email: impl Into<String>, display_name: Option<&str>) -> Self {
        let email = email.into();
        let display_name = display_name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .or_else(|| (!email.is_empty()).then(|| email.clone()))
            .unwrap_or_else(|| FALLBACK_DISPLAY_NAME.to_string());
        Self {
            id: id.into(),
            display_name,
            email,
        }
    }
}
