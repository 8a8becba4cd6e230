use async_trait::async_trait;
use pgwire::api::auth::{AuthSource, LoginInfo, Password};
use pgwire::error::PgWireResult;

/// Who is on the other end of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Full access: every appointment, deletes, edits, retention.
    Admin,
    /// A client identified by its login name, which doubles as `client_ref`.
    Client,
}

impl Role {
    pub fn for_user(user: &str, admin_user: &str) -> Role {
        if user == admin_user { Role::Admin } else { Role::Client }
    }
}

/// The administrator has its own password; every other user name shares
/// the client password.
#[derive(Debug)]
pub struct SlotwiseAuthSource {
    admin_user: String,
    admin_password: String,
    client_password: String,
}

impl SlotwiseAuthSource {
    pub fn new(admin_user: String, admin_password: String, client_password: String) -> Self {
        Self {
            admin_user,
            admin_password,
            client_password,
        }
    }

    fn password_for(&self, user: Option<&str>) -> &str {
        match user {
            Some(user) if Role::for_user(user, &self.admin_user) == Role::Admin => &self.admin_password,
            _ => &self.client_password,
        }
    }
}

#[async_trait]
impl AuthSource for SlotwiseAuthSource {
    async fn get_password(&self, login: &LoginInfo) -> PgWireResult<Password> {
        let password = self.password_for(login.user());
        Ok(Password::new(None, password.as_bytes().to_vec()))
    }
}
