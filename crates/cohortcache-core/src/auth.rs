//! The signed-in user, as reported by whatever auth layer hosts the resolver.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Subject id issued by the auth provider; matches `Contact::auth_id`.
    pub auth_id: String,
    pub email: Option<String>,
}

pub trait IdentityProvider: Send + Sync {
    fn current_user(&self) -> Option<Identity>;
}

/// A fixed identity, for tests and the command line.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity(pub Option<Identity>);

impl StaticIdentity {
    pub fn signed_in(auth_id: &str) -> Self {
        Self(Some(Identity {
            auth_id: auth_id.to_string(),
            email: None,
        }))
    }

    pub fn anonymous() -> Self {
        Self(None)
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_user(&self) -> Option<Identity> {
        self.0.clone()
    }
}
