use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capabilities: u8 {
        const READ_HIDDEN = 0b001;
        const READ_LOCKED = 0b010;
        const WRITE = 0b100;
    }
}

/// Who is looking at the workspace. Passed explicitly to every query and
/// operation that cares; there is no ambient "current user".
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Session {
    user: Option<String>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self { user: None }
    }

    pub fn authenticated(user: impl Into<String>) -> Self {
        let user = user.into();
        let trimmed = user.trim();
        if trimmed.is_empty() {
            return Self::anonymous();
        }
        Self {
            user: Some(trimmed.to_owned()),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn capabilities(&self) -> Capabilities {
        if self.is_authenticated() {
            Capabilities::all()
        } else {
            Capabilities::empty()
        }
    }

    pub fn can(&self, capability: Capabilities) -> bool {
        self.capabilities().contains(capability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_user_is_anonymous() {
        let session = Session::authenticated("   ");
        assert!(!session.is_authenticated());
        assert!(!session.can(Capabilities::WRITE));
    }

    #[test]
    fn authenticated_user_holds_every_capability() {
        let session = Session::authenticated(" admin ");
        assert_eq!(session.user(), Some("admin"));
        assert!(session.can(Capabilities::READ_HIDDEN | Capabilities::WRITE));
    }
}
