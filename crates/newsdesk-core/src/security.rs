use crate::domain::UserId;

/// Who may start a new article with `/add` (or by sending a photo).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AuthoringPolicy {
    /// Anyone who can reach the bot may submit articles.
    #[default]
    Open,
    /// Only ids in the admin allowlist.
    AdminsOnly,
}

/// Static allowlist of admin identities. Gates `/edit`, `/delete` and `/publish`.
#[derive(Clone, Debug, Default)]
pub struct AccessPolicy {
    admins: Vec<i64>,
    authoring: AuthoringPolicy,
}

impl AccessPolicy {
    pub fn new(admins: Vec<i64>, authoring: AuthoringPolicy) -> Self {
        Self { admins, authoring }
    }

    pub fn is_admin(&self, user_id: UserId) -> bool {
        is_authorized(Some(user_id), &self.admins)
    }

    pub fn can_author(&self, user_id: UserId) -> bool {
        match self.authoring {
            AuthoringPolicy::Open => true,
            AuthoringPolicy::AdminsOnly => self.is_admin(user_id),
        }
    }
}

pub fn is_authorized(user_id: Option<UserId>, allowed_users: &[i64]) -> bool {
    let Some(user_id) = user_id else {
        return false;
    };
    if allowed_users.is_empty() {
        return false;
    }
    allowed_users.contains(&user_id.0)
}
