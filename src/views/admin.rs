use super::ViewContext;
use crate::{
    backend_client::BackendApi,
    error::ViewError,
    session::Role,
    types::{NewUser, Report, ReportStatus, User, UserField, UserStatus},
};
use log::{debug, info};
use serde_valid::Validate;

/// Reports and user activity shown on the admin dashboard
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AdminOverview {
    pub reports: Vec<Report>,
    pub users: Vec<UserStatus>,
}

impl AdminOverview {
    pub fn active_users(&self) -> usize {
        self.users.iter().filter(|u| u.is_active()).count()
    }

    pub fn pending_reports(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| r.status == ReportStatus::Pending)
            .count()
    }
}

pub struct AdminDashboard<B> {
    ctx: ViewContext<B>,
}

impl<B: BackendApi> AdminDashboard<B> {
    pub fn new(ctx: ViewContext<B>) -> Result<Self, ViewError> {
        Ok(Self {
            ctx: ctx.require(Role::Admin)?,
        })
    }

    /// Fetch all reports and the user status list concurrently
    pub async fn load(&self) -> Result<AdminOverview, ViewError> {
        debug!("load() called");

        let ctx = &self.ctx;
        let (reports, users) = tokio::try_join!(
            ctx.call(ctx.api.reports(&ctx.token, None)),
            ctx.call(ctx.api.users_status(&ctx.token)),
        )?;

        Ok(AdminOverview { reports, users })
    }

    pub async fn delete_report(&self, id: &str) -> Result<(), ViewError> {
        debug!("delete_report() called with id: {id}");

        self.ctx
            .call(self.ctx.api.delete_report(&self.ctx.token, id))
            .await?;
        info!("deleted report {id}");
        Ok(())
    }

    pub async fn users(&self) -> Result<Vec<User>, ViewError> {
        debug!("users() called");

        self.ctx.call(self.ctx.api.users(&self.ctx.token)).await
    }

    /// Create a user after local validation and a duplicate check of
    /// username and e-mail
    pub async fn create_user(&self, user: NewUser) -> Result<User, ViewError> {
        debug!("create_user() called for {}", user.username);

        user.validate()
            .map_err(|e| ViewError::Validation(e.to_string()))?;

        let ctx = &self.ctx;
        let (username_taken, email_taken) = tokio::try_join!(
            ctx.call(
                ctx.api
                    .user_exists(&ctx.token, UserField::Username, user.username.clone())
            ),
            ctx.call(
                ctx.api
                    .user_exists(&ctx.token, UserField::Email, user.email.clone())
            ),
        )?;

        if username_taken {
            return Err(ViewError::Conflict(format!(
                "username '{}' is already taken",
                user.username
            )));
        }
        if email_taken {
            return Err(ViewError::Conflict(format!(
                "e-mail '{}' is already registered",
                user.email
            )));
        }

        let created = ctx.call(ctx.api.create_user(&ctx.token, user)).await?;
        info!("created {} user {}", created.role, created.username);
        Ok(created)
    }

    pub async fn delete_user(&self, username: &str) -> Result<(), ViewError> {
        debug!("delete_user() called for {username}");

        self.ctx
            .call(self.ctx.api.delete_user(&self.ctx.token, username))
            .await?;
        info!("deleted user {username}");
        Ok(())
    }
}
