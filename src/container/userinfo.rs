use uuid::Uuid;

use crate::error::Result;

/// Renders the per-voter info file added to every container.
pub trait UserInfoRenderer: Send + Sync {
    fn render(&self, user_id: Uuid) -> Result<Vec<u8>>;
}

/// The default HTML rendering of the voter's user ID.
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlUserInfo;

const TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>User info</title>
</head>
<body>
    <p>User ID: {user_id}</p>
</body>
</html>
"#;

impl UserInfoRenderer for HtmlUserInfo {
    fn render(&self, user_id: Uuid) -> Result<Vec<u8>> {
        Ok(TEMPLATE
            .replace("{user_id}", &user_id.hyphenated().to_string())
            .into_bytes())
    }
}
